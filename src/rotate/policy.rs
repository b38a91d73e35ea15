//! Rotation and retention policy

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bytes per megabyte for size limits
pub const MEGABYTE: u64 = 1024 * 1024;

/// Size limit applied when none (or a non-positive one) is configured, in MB
pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

const SECONDS_PER_HOUR: u64 = 60 * 60;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Immutable settings for one rotating log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Path of the live log file
    pub path: PathBuf,
    /// Size in bytes after which the live file is rotated
    pub max_size: u64,
    /// Time-based rotation period, `None` when disabled
    pub period: Option<Duration>,
    /// Maximum number of historical files kept, `None` for unlimited
    pub max_count: Option<usize>,
    /// Maximum age of historical files, `None` for unlimited
    pub max_age: Option<Duration>,
    /// Gzip historical files after rotation
    pub compress: bool,
}

impl RotationPolicy {
    /// Size-only rotation at the default limit, no retention, no compression
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: DEFAULT_MAX_SIZE_MB * MEGABYTE,
            period: None,
            max_count: None,
            max_age: None,
            compress: false,
        }
    }

    /// Build a policy from operator-facing units
    ///
    /// `max_size_mb <= 0` falls back to the default size, zero hours disables
    /// periodic rotation, and zero days or count means unlimited.
    pub fn from_limits(
        path: impl Into<PathBuf>,
        max_size_mb: i64,
        period_hours: u64,
        max_age_days: u64,
        max_count: usize,
        compress: bool,
    ) -> Self {
        Self::new(path)
            .with_max_size_mb(max_size_mb)
            .with_period_hours(period_hours)
            .with_max_age_days(max_age_days)
            .with_max_count(max_count)
            .with_compress(compress)
    }

    /// Set the size limit in megabytes
    pub fn with_max_size_mb(mut self, mb: i64) -> Self {
        let mb = if mb <= 0 { DEFAULT_MAX_SIZE_MB } else { mb as u64 };
        self.max_size = mb.saturating_mul(MEGABYTE);
        self
    }

    /// Set the size limit in bytes (zero falls back to the default)
    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size = if bytes == 0 {
            DEFAULT_MAX_SIZE_MB * MEGABYTE
        } else {
            bytes
        };
        self
    }

    /// Set the rotation period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = (!period.is_zero()).then_some(period);
        self
    }

    /// Set the rotation period in hours
    pub fn with_period_hours(self, hours: u64) -> Self {
        self.with_period(Duration::from_secs(hours.saturating_mul(SECONDS_PER_HOUR)))
    }

    /// Set the maximum number of historical files
    pub fn with_max_count(mut self, count: usize) -> Self {
        self.max_count = (count > 0).then_some(count);
        self
    }

    /// Set the maximum age of historical files
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = (!age.is_zero()).then_some(age);
        self
    }

    /// Set the maximum age of historical files in days
    pub fn with_max_age_days(self, days: u64) -> Self {
        self.with_max_age(Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)))
    }

    /// Enable or disable gzip compression of historical files
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Path of the live log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a compaction pass has anything to do
    pub fn needs_compaction(&self) -> bool {
        self.max_count.is_some() || self.max_age.is_some() || self.compress
    }
}
