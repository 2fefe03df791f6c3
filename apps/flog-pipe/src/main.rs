//! flog-pipe entry point.
//!
//! Usage: `flog-pipe [config.toml]`. Every stdin line becomes a log record;
//! the process's own `tracing` output is captured too.

mod app;
mod config;

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> anyhow::Result<()> {
    // Structured logging to stderr, mirrored into the collector.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(flog_collector::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting flog-pipe");

    let config = config::load()?;
    tracing::info!(endpoint = %config.endpoint, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(app::run(config));
    // A pending stdin read would otherwise hold up runtime shutdown.
    rt.shutdown_timeout(Duration::from_secs(1));
    result?;

    tracing::info!("flog-pipe shut down cleanly");
    Ok(())
}
