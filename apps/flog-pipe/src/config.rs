//! Configuration lookup.
//!
//! The TOML file comes from the first argument or `FLOG_CONFIG`;
//! `FLOG_ENDPOINT` overrides the endpoint either way.

use std::path::PathBuf;

use anyhow::Context;
use flog_collector::Config;

/// Loads configuration from the command line and environment.
pub fn load() -> anyhow::Result<Config> {
    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("FLOG_CONFIG"))
        .map(PathBuf::from);
    let endpoint = std::env::var("FLOG_ENDPOINT").ok();

    resolve(path, endpoint)
}

fn resolve(path: Option<PathBuf>, endpoint: Option<String>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
        config.endpoint = endpoint;
    }

    config.validate()?;
    Ok(config)
}
