//! Record layout shared by the file and console layers
//!
//! Every line starts with `app_name=<name>`. ERROR records also carry the
//! source file and line of the call site.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{self, Format, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Event formatter tagging records with the application name
pub struct RecordFormat {
    app_name: String,
    plain: Format,
    located: Format,
}

impl RecordFormat {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            plain: format::format().with_target(true),
            located: format::format()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        }
    }
}

impl<S, N> FormatEvent<S, N> for RecordFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "app_name={} ", self.app_name)?;
        if *event.metadata().level() == Level::ERROR {
            self.located.format_event(ctx, writer, event)
        } else {
            self.plain.format_event(ctx, writer, event)
        }
    }
}
