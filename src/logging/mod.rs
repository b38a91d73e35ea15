//! Logging setup for rotalog
//!
//! Wires the rotating file writer, an optional console layer, and the error
//! reporter into one tracing subscriber.

mod file_writer;
mod format;
mod level;
mod report;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::rotate::RotatingWriter;

pub use file_writer::{FallbackWriter, RotatingMakeWriter};
pub use format::RecordFormat;
pub use level::{
    cap_message, parse_log_line, LogLevel, LogLine, MAX_MESSAGE_LEN, TRUNCATED_LEN,
};
pub use report::{
    report_channel, spawn_report_collector, ErrorReport, ReportLayer, ReportReceiver,
    ReportSender, Reporter,
};

/// Guard that keeps the log file open
///
/// Dropping it closes the rotating writer. Records logged afterwards reopen
/// the file lazily.
pub struct LoggingGuard {
    writer: Option<Arc<RotatingWriter>>,
}

impl LoggingGuard {
    /// The rotating writer behind the file layer, if file logging is on
    pub fn writer(&self) -> Option<&Arc<RotatingWriter>> {
        self.writer.as_ref()
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        if let Some(writer) = &self.writer {
            if let Err(e) = writer.close() {
                eprintln!("rotalog: failed to close {}: {}", writer.path().display(), e);
            }
        }
    }
}

/// Level filter from `RUST_LOG`, or from the configured level name
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = LevelFilter::from(LogLevel::parse(log_level));
        EnvFilter::new(level.to_string())
    })
}

/// Install the global subscriber
///
/// `writer` receives every record as plain text. With `config.console` set,
/// records are printed to stdout as well. ERROR records also go to `reporter`.
/// Each line is tagged with `config.app_name`; ERROR lines carry their call site.
pub fn init_logging(
    config: &Config,
    writer: Option<Arc<RotatingWriter>>,
    reporter: Reporter,
) -> Result<LoggingGuard> {
    let file_layer = writer.as_ref().map(|writer| {
        tracing_subscriber::fmt::layer()
            .event_format(RecordFormat::new(config.app_name.as_str()))
            .with_writer(RotatingMakeWriter::new(Arc::clone(writer)))
            .with_ansi(false)
    });

    let console_layer = config.console.then(|| {
        tracing_subscriber::fmt::layer()
            .event_format(RecordFormat::new(config.app_name.as_str()))
            .with_writer(std::io::stdout)
    });

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(file_layer)
        .with(console_layer)
        .with(reporter.layer())
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(LoggingGuard { writer })
}

/// Re-emit a parsed line through tracing at its own level
pub fn emit(line: &LogLine) {
    match line.level {
        LogLevel::Trace => tracing::trace!(source = %line.target, "{}", line.message),
        LogLevel::Debug => tracing::debug!(source = %line.target, "{}", line.message),
        LogLevel::Info => tracing::info!(source = %line.target, "{}", line.message),
        LogLevel::Warn => tracing::warn!(source = %line.target, "{}", line.message),
        LogLevel::Error => tracing::error!(source = %line.target, "{}", line.message),
    }
}
