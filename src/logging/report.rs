//! Error reporting
//!
//! ERROR records are copied to a reporter alongside the normal log output.
//! The reporter is an explicit value handed to the logging setup; when it is
//! `Disabled` no layer is installed at all.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context as LayerContext;
use tracing_subscriber::Layer;
use uuid::Uuid;

use super::level::LogLevel;

/// Sender half of the report channel
pub type ReportSender = mpsc::Sender<ErrorReport>;

/// Receiver half of the report channel
pub type ReportReceiver = mpsc::Receiver<ErrorReport>;

/// Create a bounded channel for error reports
pub fn report_channel(buffer: usize) -> (ReportSender, ReportReceiver) {
    mpsc::channel(buffer)
}

/// One error record forwarded to the collector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub app_name: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// Where error records are sent
#[derive(Debug, Clone, Default)]
pub enum Reporter {
    /// Reporting is off
    #[default]
    Disabled,
    /// Reports are forwarded to a channel consumer
    Forward {
        sender: ReportSender,
        app_name: String,
    },
}

impl Reporter {
    /// Forward reports tagged with `app_name` into `sender`
    pub fn forward(sender: ReportSender, app_name: impl Into<String>) -> Self {
        Reporter::Forward {
            sender,
            app_name: app_name.into(),
        }
    }

    /// Whether reports go anywhere
    pub fn is_enabled(&self) -> bool {
        matches!(self, Reporter::Forward { .. })
    }

    /// Hand a report over without blocking
    ///
    /// Returns `false` if reporting is disabled, the channel is full, or the
    /// consumer is gone.
    pub fn report(&self, report: ErrorReport) -> bool {
        let Reporter::Forward { sender, .. } = self else {
            return false;
        };

        match sender.try_send(report) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // tracing here would feed straight back into this layer
                eprintln!("rotalog: report channel full, dropping error report");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Layer that copies ERROR events to this reporter, if enabled
    pub fn layer(self) -> Option<ReportLayer> {
        self.is_enabled().then_some(ReportLayer { reporter: self })
    }
}

/// tracing layer forwarding ERROR events to a [`Reporter`]
pub struct ReportLayer {
    reporter: Reporter,
}

impl<S: Subscriber> Layer<S> for ReportLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let level = LogLevel::from(*event.metadata().level());
        if !level.is_reportable() {
            return;
        }

        let app_name = match &self.reporter {
            Reporter::Forward { app_name, .. } => app_name.clone(),
            Reporter::Disabled => return,
        };

        let mut visitor = ReportVisitor::default();
        event.record(&mut visitor);

        let mut message = visitor.message.unwrap_or_default();
        if let Some(kind) = visitor.fields.get("kind") {
            message.push_str(&format!("[{kind}]"));
        }

        self.reporter.report(ErrorReport {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            app_name,
            level: level.as_str().to_string(),
            target: event.metadata().target().to_string(),
            message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct ReportVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl Visit for ReportVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}

/// Append every received report to `path` as one JSON line
///
/// The task ends when every sender is dropped.
pub fn spawn_report_collector(
    receiver: ReportReceiver,
    path: PathBuf,
) -> JoinHandle<Result<usize>> {
    tokio::spawn(collect_reports(receiver, path))
}

async fn collect_reports(mut receiver: ReportReceiver, path: PathBuf) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create report directory")?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .context("Failed to open report file")?;

    let mut count = 0;
    while let Some(report) = receiver.recv().await {
        let mut line = serde_json::to_string(&report).context("Failed to serialize report")?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .context("Failed to write report")?;
        file.flush().await.context("Failed to flush report file")?;
        count += 1;
    }

    Ok(count)
}
