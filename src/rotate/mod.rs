//! Rotating log file writer
//!
//! Provides a thread-safe `Write` sink that rotates its file by time and size,
//! recovers rotation state from the directory on restart, and keeps the
//! rotated history trimmed and compressed from a background thread.

pub mod clock;
pub mod compactor;
pub mod cursor;
mod error;
pub mod naming;
mod policy;
mod writer;

pub use clock::{bucket_start, Clock, SystemClock};
pub use compactor::{compact, CompactionReport, HistoricalFile};
pub use cursor::{resolve_state, DirSnapshot, ResumePoint};
pub use error::RotateError;
pub use naming::{FileNaming, BACKUP_TIME_FORMAT, COMPRESS_SUFFIX};
pub use policy::{RotationPolicy, DEFAULT_MAX_SIZE_MB, MEGABYTE};
pub use writer::RotatingWriter;
