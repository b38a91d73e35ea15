//! Log levels and level detection in raw text lines

use std::borrow::Cow;

use tracing::level_filters::LevelFilter;

/// Log level as understood by the configuration and the line parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Get the display name for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parse a configured level name
    ///
    /// FATAL and PANIC map to ERROR. Unknown names fall back to INFO.
    pub fn parse(name: &str) -> Self {
        Self::from_token(name.trim()).unwrap_or(LogLevel::Info)
    }

    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" | "FATAL" | "PANIC" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Whether records at this level go to the error reporter
    pub fn is_reportable(&self) -> bool {
        matches!(self, LogLevel::Error)
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Messages longer than this are cut down to [`TRUNCATED_LEN`] bytes
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// Bytes kept from an oversized message
pub const TRUNCATED_LEN: usize = 1_000;

/// Cap an oversized message, marking the cut with `...`
pub fn cap_message(message: &str) -> Cow<'_, str> {
    if message.len() <= MAX_MESSAGE_LEN {
        return Cow::Borrowed(message);
    }

    let mut end = TRUNCATED_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}...", &message[..end]))
}

/// A text line split into level, source and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
}

/// Parse a raw line such as `2026-01-21T14:30:45Z  WARN db::pool: slow query`
///
/// The first level-looking token picks the level (INFO if there is none) and
/// everything after it is the message. A leading `target: ` is split off when
/// it looks like a module path or a single word.
pub fn parse_log_line(line: &str, default_target: &str) -> Option<LogLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut level = LogLevel::Info;
    let mut message = line;
    let mut offset = 0;
    for token in line.split_whitespace() {
        let start = offset + line[offset..].find(token).unwrap_or(0);
        offset = start + token.len();
        let bare = token.trim_matches(|c: char| c == '[' || c == ']' || c == ':');
        if let Some(found) = LogLevel::from_token(bare) {
            level = found;
            message = line[offset..].trim();
            break;
        }
    }

    let (target, message) = match message.find(": ") {
        Some(colon) => {
            let candidate = &message[..colon];
            if candidate.contains("::") || (!candidate.is_empty() && !candidate.contains(' ')) {
                (candidate.to_string(), message[colon + 2..].to_string())
            } else {
                (default_target.to_string(), message.to_string())
            }
        }
        None => (default_target.to_string(), message.to_string()),
    };

    let message = cap_message(&message).into_owned();

    Some(LogLine {
        level,
        target,
        message,
    })
}
