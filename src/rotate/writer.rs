//! The rotating writer
//!
//! Appends records to a live log file and rotates it when the rotation period
//! elapses or the next record would push it past the size limit.

use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};

use super::clock::{bucket_start, Clock, SystemClock};
use super::compactor::{self, Mailbox};
use super::cursor::{list_names, next_cursor, resolve_state, DirSnapshot};
use super::error::RotateError;
use super::naming::{FileNaming, COMPRESS_SUFFIX};
use super::policy::RotationPolicy;

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Mutable state, only touched with the writer lock held
#[derive(Debug, Default)]
struct WriterState {
    file: Option<File>,
    size: u64,
    bucket_start: Option<DateTime<Local>>,
    /// Cursor the next rotation renames to; `None` until resolved from disk
    cursor: Option<u32>,
}

/// A `Write` sink that rotates its file by time and size
///
/// All writes, rotations and `close` calls are serialized behind one lock.
/// Historical files are handed to a background compactor after each rotation.
pub struct RotatingWriter {
    policy: RotationPolicy,
    naming: FileNaming,
    path: PathBuf,
    state: Mutex<WriterState>,
    mailbox: Mailbox,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RotatingWriter {
    /// Create a writer for `policy` and start its compactor
    ///
    /// The file itself is opened lazily on the first write.
    pub fn new(policy: RotationPolicy) -> io::Result<Self> {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Create a writer that reads the current time from `clock`
    pub fn with_clock(policy: RotationPolicy, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let naming = FileNaming::new(&policy.path);
        let mailbox = compactor::spawn(naming.clone(), policy.clone())?;
        Ok(Self::from_parts(policy, naming, mailbox, clock))
    }

    fn from_parts(
        policy: RotationPolicy,
        naming: FileNaming,
        mailbox: Mailbox,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let path = naming.dir().join(naming.live_name());
        Self {
            policy,
            naming,
            path,
            state: Mutex::new(WriterState::default()),
            mailbox,
            clock,
        }
    }

    /// Path of the live log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Policy this writer was built with
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Bytes accounted to the live file
    pub fn current_size(&self) -> u64 {
        self.lock().size
    }

    /// Append `buf` as one record, rotating first if needed
    ///
    /// The record is never split across files. On error nothing is accounted.
    pub fn write_record(&self, buf: &[u8]) -> Result<usize, RotateError> {
        let mut state = self.lock();
        let now = self.clock.now();

        if state.file.is_none() {
            self.open(&mut state, now)?;
        }

        if let (Some(period), Some(bucket)) = (self.policy.period, state.bucket_start) {
            let elapsed = chrono::Duration::from_std(period)
                .ok()
                .and_then(|p| bucket.checked_add_signed(p))
                .is_some_and(|next| now >= next);

            if elapsed {
                self.rotate(&mut state)?;
                let next = bucket_start(now, Some(period));
                state.bucket_start = Some(next);
                state.cursor = Some(self.first_cursor(next));
            }
        }

        let len = buf.len() as u64;
        if state.size > 0 && state.size.saturating_add(len) > self.policy.max_size {
            if self.policy.period.is_none() {
                let stamp = bucket_start(now, None);
                if state.bucket_start != Some(stamp) {
                    state.bucket_start = Some(stamp);
                    state.cursor = Some(self.first_cursor(stamp));
                }
            }
            self.rotate(&mut state)?;
            state.cursor = state.cursor.map(|c| c.saturating_add(1));
        }

        let file = match state.file.as_mut() {
            Some(file) => file,
            None => return Err(self.not_open()),
        };
        file.write_all(buf).map_err(|source| RotateError::Write {
            path: self.path.clone(),
            source,
        })?;
        state.size += len;

        Ok(buf.len())
    }

    /// Close the live file; the next write reopens it
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.lock();
        match state.file.take() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        // Every failure path leaves `file` empty, so a poisoned state is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resume the live file or create it, and recover bucket and cursor
    fn open(&self, state: &mut WriterState, now: DateTime<Local>) -> Result<(), RotateError> {
        self.ensure_dir()?;

        let snapshot = DirSnapshot::capture(&self.naming).map_err(|source| RotateError::Stat {
            path: self.path.clone(),
            source,
        })?;
        let resume = resolve_state(&snapshot, &self.naming, self.policy.period, now);
        state.bucket_start = Some(resume.bucket_start);
        state.cursor = Some(resume.cursor);

        if snapshot.live_modified.is_none() {
            state.file = Some(self.open_fresh(None)?);
            state.size = 0;
            return Ok(());
        }

        match OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => {
                let size = file
                    .metadata()
                    .map_err(|source| RotateError::Stat {
                        path: self.path.clone(),
                        source,
                    })?
                    .len();
                state.file = Some(file);
                state.size = size;
                Ok(())
            }
            Err(_) => {
                // Unusable live file: move it aside and start a new one.
                self.rotate(state)?;
                state.cursor = state.cursor.map(|c| c.saturating_add(1));
                Ok(())
            }
        }
    }

    /// Move the live file to its historical name and start a new one
    fn rotate(&self, state: &mut WriterState) -> Result<(), RotateError> {
        if let Some(mut file) = state.file.take() {
            let _ = file.flush();
        }

        let (bucket, cursor) = match (state.bucket_start, state.cursor) {
            (Some(bucket), Some(cursor)) => (bucket, cursor),
            _ => return Err(self.not_open()),
        };

        self.ensure_dir()?;

        let mut permissions = None;
        match fs::metadata(&self.path) {
            Ok(meta) => {
                let cursor = self.free_cursor(bucket, cursor);
                state.cursor = Some(cursor);
                let target = self.naming.historical_path(bucket, cursor);
                fs::rename(&self.path, &target).map_err(|source| RotateError::Rename {
                    from: self.path.clone(),
                    to: target.clone(),
                    source,
                })?;
                permissions = Some(meta.permissions());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RotateError::Stat {
                    path: self.path.clone(),
                    source,
                })
            }
        }

        state.file = Some(self.open_fresh(permissions)?);
        state.size = 0;

        self.mailbox.signal();
        Ok(())
    }

    /// Create the live file, truncating anything recreated behind our back
    fn open_fresh(&self, permissions: Option<Permissions>) -> Result<File, RotateError> {
        let open_err = |source| RotateError::Open {
            path: self.path.clone(),
            source,
        };

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let mode = permissions.as_ref().map_or(FILE_MODE, |p| p.mode() & 0o7777);
            options.mode(mode);
        }

        let file = options.open(&self.path).map_err(open_err)?;
        if let Some(permissions) = permissions {
            file.set_permissions(permissions).map_err(open_err)?;
        }
        Ok(file)
    }

    /// Cursor for the first rotation of a bucket just entered
    ///
    /// Local timestamps repeat when clocks go back, so a new bucket can share
    /// its name with one already on disk.
    fn first_cursor(&self, bucket: DateTime<Local>) -> u32 {
        match list_names(self.naming.dir()) {
            Ok(names) => next_cursor(
                names.iter().map(String::as_str),
                &self.naming.bucket_prefix(bucket),
            ),
            // rotate() still refuses to rename onto an existing name
            Err(_) => 1,
        }
    }

    /// First cursor from `cursor` up whose name is taken by neither a plain
    /// nor a compressed historical file
    ///
    /// Only regular files count; anything else at the target makes the rename
    /// fail and is reported.
    fn free_cursor(&self, bucket: DateTime<Local>, mut cursor: u32) -> u32 {
        loop {
            let plain = self.naming.historical_path(bucket, cursor);
            let mut compressed = plain.clone().into_os_string();
            compressed.push(COMPRESS_SUFFIX);
            if !plain.is_file() && !Path::new(&compressed).is_file() {
                return cursor;
            }
            cursor = cursor.saturating_add(1);
        }
    }

    fn ensure_dir(&self) -> Result<(), RotateError> {
        let dir = self.naming.dir();
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(dir).map_err(|source| RotateError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
    }

    fn not_open(&self) -> RotateError {
        RotateError::Open {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::Other, "log file is not open"),
        }
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self).flush()
    }
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_record(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
