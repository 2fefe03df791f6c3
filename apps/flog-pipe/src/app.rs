//! Main loop: stdin lines in, batches out.

use std::sync::Arc;

use flog_collector::{Collector, Config, Host, HttpTransport, Level, Logger};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Runs until stdin closes or Ctrl-C, then flushes and waits for delivery.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let transport = Arc::new(HttpTransport::new()?);
    let host = Host::process_default();
    let unload = Arc::clone(&host.unload);

    let collector = Collector::new(host, transport.clone());
    collector.init(config)?;
    collector.set_property("source", "flog-pipe");
    collector.set_property("pid", std::process::id());

    let logger = collector.logger();
    let stdin = BufReader::new(tokio::io::stdin());
    let forwarded = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            None
        }
        result = forward_lines(stdin, &logger) => Some(result?),
    };
    tracing::info!(?forwarded, "input finished");

    unload.fire();
    collector.destroy();
    transport.shutdown().await;
    Ok(())
}

/// Logs every non-blank line. Returns how many were forwarded.
async fn forward_lines<R>(reader: R, logger: &Logger) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let (level, message) = parse_line(&line);
        logger.emit(level, message, None);
        forwarded += 1;
    }

    Ok(forwarded)
}

/// Splits an optional `level:` prefix off a line. Defaults to info.
fn parse_line(line: &str) -> (Level, &str) {
    let Some((prefix, rest)) = line.split_once(':') else {
        return (Level::Info, line);
    };

    let level = match prefix.trim().to_ascii_lowercase().as_str() {
        "error" => Level::Error,
        "warn" | "warning" => Level::Warn,
        "info" | "log" => Level::Info,
        "debug" => Level::Debug,
        _ => return (Level::Info, line),
    };
    (level, rest.trim_start())
}
