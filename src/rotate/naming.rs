//! Historical file naming
//!
//! A live file `dir/app.log` rotates into `dir/app.<YYYY_MM_DDTHH_MM_SS>.<cursor>.log`,
//! optionally followed by `.gz` once compacted.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Timestamp layout embedded in historical file names
pub const BACKUP_TIME_FORMAT: &str = "%Y_%m_%dT%H_%M_%S";

/// Suffix appended to compressed historical files
pub const COMPRESS_SUFFIX: &str = ".gz";

/// Name components derived from the live file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    dir: PathBuf,
    file_name: String,
    stem: String,
    ext: String,
}

impl FileNaming {
    /// Split a live file path into directory, stem and extension
    ///
    /// `logs/app.log` yields stem `app` and extension `.log`. A path without an
    /// extension keeps an empty one.
    pub fn new(path: &Path) -> Self {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (stem, ext) = match file_name.rfind('.') {
            Some(idx) if idx > 0 => (file_name[..idx].to_string(), file_name[idx..].to_string()),
            _ => (file_name.clone(), String::new()),
        };

        Self {
            dir,
            file_name,
            stem,
            ext,
        }
    }

    /// Directory holding the live file and its history
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of the live file
    pub fn live_name(&self) -> &str {
        &self.file_name
    }

    /// Extension of the live file, including the leading dot
    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Name prefix shared by every rotation of one bucket, e.g. `app.2026_03_10T00_00_00.`
    pub fn bucket_prefix(&self, bucket: DateTime<Local>) -> String {
        format!("{}.{}.", self.stem, bucket.format(BACKUP_TIME_FORMAT))
    }

    /// Name of the `cursor`-th rotation within `bucket`
    pub fn historical_name(&self, bucket: DateTime<Local>, cursor: u32) -> String {
        format!("{}{}{}", self.bucket_prefix(bucket), cursor, self.ext)
    }

    /// Full path of the `cursor`-th rotation within `bucket`
    pub fn historical_path(&self, bucket: DateTime<Local>, cursor: u32) -> PathBuf {
        self.dir.join(self.historical_name(bucket, cursor))
    }

    /// Parse the bucket timestamp out of a historical file name
    ///
    /// Returns `None` when the name does not carry this file's stem and `ext`,
    /// or when the embedded timestamp does not parse.
    ///
    /// Names carry no UTC offset. A timestamp from the repeated hour after
    /// clocks go back resolves to its first occurrence, so only the name, not
    /// the instant, survives a round trip. Cursors keep such files distinct.
    pub fn parse_name(&self, name: &str, ext: &str) -> Option<DateTime<Local>> {
        let middle = name
            .strip_prefix(self.stem.as_str())?
            .strip_prefix('.')?
            .strip_suffix(ext)?;
        let stamp = middle.split('.').next()?;

        let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).ok()?;
        Local.from_local_datetime(&naive).earliest()
    }

    /// Parse a name that is either a plain or a compressed historical file
    pub fn parse_historical(&self, name: &str) -> Option<DateTime<Local>> {
        if name == self.file_name {
            return None;
        }
        self.parse_name(name, &self.ext).or_else(|| {
            let compressed = format!("{}{}", self.ext, COMPRESS_SUFFIX);
            self.parse_name(name, &compressed)
        })
    }
}

/// Whether a historical file has already been compressed
pub fn is_compressed(name: &str) -> bool {
    name.ends_with(COMPRESS_SUFFIX)
}

/// Name shared by a file and its compressed counterpart
pub fn logical_name(name: &str) -> &str {
    name.strip_suffix(COMPRESS_SUFFIX).unwrap_or(name)
}
