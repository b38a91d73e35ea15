use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use rotalog::config::Config;
use rotalog::logging::{self, Reporter};
use rotalog::rotate::RotatingWriter;

/// Capacity of the error report channel
const REPORT_BUFFER: usize = 256;

/// How long to wait for queued reports on exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    let (reporter, collector) = match &config.report_path {
        Some(path) => {
            let (tx, rx) = logging::report_channel(REPORT_BUFFER);
            let collector = logging::spawn_report_collector(rx, path.clone());
            let reporter = Reporter::forward(tx.clone(), config.app_name.clone());
            (reporter, Some((tx, collector)))
        }
        None => (Reporter::Disabled, None),
    };

    let writer = if config.file.enable {
        let policy = config.rotation_policy();
        let writer = RotatingWriter::new(policy).with_context(|| {
            format!(
                "Failed to start log rotation for {}",
                config.log_file_path().display()
            )
        })?;
        Some(Arc::new(writer))
    } else {
        None
    };

    // Initialize logging BEFORE any tracing calls
    let guard = logging::init_logging(&config, writer, reporter)?;

    if let Some(writer) = guard.writer() {
        tracing::info!("Logging to: {}", writer.path().display());
    }

    let lines = tokio::task::spawn_blocking(pipe_stdin)
        .await
        .context("stdin reader panicked")??;

    tracing::debug!("Forwarded {} lines", lines);
    drop(guard);

    // The subscriber keeps a sender alive for the life of the process, so the
    // collector never sees the channel close on its own
    if let Some((tx, collector)) = collector {
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while tx.capacity() < tx.max_capacity() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        collector.abort();
    }

    Ok(())
}

/// Forward stdin lines through the logging façade until EOF
fn pipe_stdin() -> Result<usize> {
    let stdin = std::io::stdin();
    let mut count = 0;
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if let Some(entry) = logging::parse_log_line(&line, "stdin") {
            logging::emit(&entry);
            count += 1;
        }
    }
    Ok(count)
}
