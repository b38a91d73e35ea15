//! Rotation state recovery
//!
//! Nothing about rotation is persisted. On every open the writer looks at the
//! live file and its siblings to work out which bucket it is in and which
//! cursor the next rotation must use.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};

use super::clock::bucket_start;
use super::naming::FileNaming;

/// What the filesystem says about a live file and its directory
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    /// Modification time of the live file, if it exists
    pub live_modified: Option<DateTime<Local>>,
    /// Names of every entry in the directory
    pub entries: Vec<String>,
}

impl DirSnapshot {
    /// Stat the live file and list its directory
    ///
    /// A missing directory is an empty snapshot.
    pub fn capture(naming: &FileNaming) -> io::Result<Self> {
        let live_path = naming.dir().join(naming.live_name());
        let live_modified = match fs::metadata(&live_path) {
            Ok(meta) => Some(DateTime::<Local>::from(meta.modified()?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            live_modified,
            entries: list_names(naming.dir())?,
        })
    }
}

/// Bucket and cursor a writer resumes with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    /// Start of the bucket the live file belongs to
    pub bucket_start: DateTime<Local>,
    /// Cursor the next rotation within that bucket will use
    pub cursor: u32,
}

/// Work out where rotation resumes from a directory snapshot
///
/// The bucket comes from the live file's modification time, or from `now` when
/// there is no live file yet. The cursor is one past the highest cursor already
/// on disk for that bucket.
pub fn resolve_state(
    snapshot: &DirSnapshot,
    naming: &FileNaming,
    period: Option<Duration>,
    now: DateTime<Local>,
) -> ResumePoint {
    let bucket = bucket_start(snapshot.live_modified.unwrap_or(now), period);
    let cursor = next_cursor(
        snapshot.entries.iter().map(String::as_str),
        &naming.bucket_prefix(bucket),
    );

    ResumePoint {
        bucket_start: bucket,
        cursor,
    }
}

/// One past the highest cursor among names starting with `prefix`, or 1
pub fn next_cursor<'a>(names: impl IntoIterator<Item = &'a str>, prefix: &str) -> u32 {
    names
        .into_iter()
        .filter_map(|name| name.strip_prefix(prefix))
        .filter_map(|rest| rest.split('.').next())
        .filter_map(|segment| segment.parse::<u32>().ok())
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

/// Names of the entries of `dir`; empty if it does not exist
pub(crate) fn list_names(dir: &Path) -> io::Result<Vec<String>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in read_dir {
        if let Some(name) = entry?.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
