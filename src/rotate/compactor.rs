//! Retention and compression of historical log files
//!
//! A single background thread owns every historical file. The writer pokes it
//! through a one-slot mailbox after each rotation; pokes that arrive while one
//! is already pending are dropped, since a pass re-examines the whole history.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader};
use std::path::Path;
use std::thread;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::naming::{is_compressed, logical_name, FileNaming, COMPRESS_SUFFIX};
use super::policy::RotationPolicy;

/// Sending side of the compaction mailbox
#[derive(Debug, Clone)]
pub struct Mailbox {
    tx: mpsc::Sender<()>,
}

/// Receiving side of the compaction mailbox
pub type MailboxReceiver = mpsc::Receiver<()>;

impl Mailbox {
    /// Create a mailbox holding at most one pending signal
    pub fn channel() -> (Mailbox, MailboxReceiver) {
        let (tx, rx) = mpsc::channel(1);
        (Mailbox { tx }, rx)
    }

    /// Post a signal without blocking
    ///
    /// Returns `false` when a signal was already pending or the worker is gone.
    pub fn signal(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// A rotated-out log file found in the log directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalFile {
    /// Entry name within the log directory
    pub name: String,
    /// Last modification time
    pub modified: DateTime<Local>,
}

/// Outcome of one compaction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Files deleted by count or age retention
    pub removed: Vec<String>,
    /// Files replaced by a compressed copy
    pub compressed: Vec<String>,
    /// Files a deletion or compression failed for
    pub failed: Vec<String>,
}

/// Split of the history into files to keep and files to delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub keep: Vec<HistoricalFile>,
    pub remove: Vec<HistoricalFile>,
}

/// Start the background compaction thread
///
/// The thread exits once every [`Mailbox`] has been dropped.
pub fn spawn(naming: FileNaming, policy: RotationPolicy) -> io::Result<Mailbox> {
    let (mailbox, mut rx) = Mailbox::channel();

    thread::Builder::new()
        .name("rotalog-compactor".to_string())
        .spawn(move || {
            while rx.blocking_recv().is_some() {
                match compact(&naming, &policy, Local::now()) {
                    Ok(report) => debug!(
                        removed = report.removed.len(),
                        compressed = report.compressed.len(),
                        failed = report.failed.len(),
                        "Compaction pass finished"
                    ),
                    Err(e) => warn!(dir = %naming.dir().display(), error = %e, "Compaction pass skipped"),
                }
            }
            debug!("Compactor stopped");
        })?;

    Ok(mailbox)
}

/// Run one retention and compression pass over the history of `naming`
pub fn compact(
    naming: &FileNaming,
    policy: &RotationPolicy,
    now: DateTime<Local>,
) -> io::Result<CompactionReport> {
    let mut report = CompactionReport::default();
    if !policy.needs_compaction() {
        return Ok(report);
    }

    let history = history_files(naming)?;
    let plan = plan_retention(history, policy, now);

    for file in &plan.remove {
        let path = naming.dir().join(&file.name);
        match fs::remove_file(&path) {
            Ok(()) => report.removed.push(file.name.clone()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove old log file");
                report.failed.push(file.name.clone());
            }
        }
    }

    if policy.compress {
        for file in plan.keep.iter().filter(|f| !is_compressed(&f.name)) {
            let src = naming.dir().join(&file.name);
            let dst = naming.dir().join(format!("{}{}", file.name, COMPRESS_SUFFIX));
            match compress_file(&src, &dst) {
                Ok(()) => report.compressed.push(file.name.clone()),
                Err(e) => {
                    warn!(path = %src.display(), error = %e, "Failed to compress log file");
                    report.failed.push(file.name.clone());
                }
            }
        }
    }

    Ok(report)
}

/// List historical files of `naming`, newest first
///
/// Directories, the live file, and names that do not parse as a rotation of
/// this file are left out.
pub fn history_files(naming: &FileNaming) -> io::Result<Vec<HistoricalFile>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(naming.dir())? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if naming.parse_historical(&name).is_none() {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        files.push(HistoricalFile {
            name,
            modified: DateTime::<Local>::from(modified),
        });
    }

    sort_newest_first(&mut files);
    Ok(files)
}

fn sort_newest_first(files: &mut [HistoricalFile]) {
    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
}

/// Decide which historical files survive count and age retention
///
/// `files` must be sorted newest first. A file and its compressed counterpart
/// count once toward the limit.
pub fn plan_retention(
    files: Vec<HistoricalFile>,
    policy: &RotationPolicy,
    now: DateTime<Local>,
) -> RetentionPlan {
    let mut plan = RetentionPlan::default();
    let mut candidates = files;

    if let Some(limit) = policy.max_count {
        if candidates.len() > limit {
            let mut seen: HashSet<String> = HashSet::new();
            let mut keep = Vec::new();

            for file in candidates {
                seen.insert(logical_name(&file.name).to_string());
                if seen.len() > limit {
                    plan.remove.push(file);
                } else {
                    keep.push(file);
                }
            }
            candidates = keep;
        }
    }

    if let Some(max_age) = policy.max_age {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age));

        if let Some(cutoff) = cutoff {
            let (expired, fresh): (Vec<_>, Vec<_>) =
                candidates.into_iter().partition(|f| f.modified < cutoff);
            plan.remove.extend(expired);
            candidates = fresh;
        }
    }

    plan.keep = candidates;
    plan
}

/// Gzip `src` into `dst` and remove `src`
///
/// On failure `src` is left in place, and `dst` is removed if this call had
/// already truncated it. The compressed file keeps the permissions and
/// modification time of the original.
pub fn compress_file(src: &Path, dst: &Path) -> io::Result<()> {
    let file = File::open(src)?;
    let metadata = file.metadata()?;

    // A leftover dst is from an interrupted earlier attempt.
    let out = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dst)?;

    if let Err(e) = write_compressed(file, &metadata, out) {
        let _ = fs::remove_file(dst);
        return Err(e);
    }
    fs::remove_file(src)
}

fn write_compressed(src: File, metadata: &fs::Metadata, out: File) -> io::Result<()> {
    out.set_permissions(metadata.permissions())?;

    let mut encoder = GzEncoder::new(out, Compression::default());
    io::copy(&mut BufReader::new(src), &mut encoder)?;
    let out = encoder.finish()?;

    if let Ok(modified) = metadata.modified() {
        out.set_modified(modified)?;
    }
    out.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::time::Duration;
    use tempfile::TempDir;

    const DAY: u64 = 24 * 60 * 60;

    struct Fixture {
        temp_dir: TempDir,
        naming: FileNaming,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let naming = FileNaming::new(&temp_dir.path().join("app.log"));
            fs::write(temp_dir.path().join("app.log"), b"live").unwrap();
            Self { temp_dir, naming }
        }

        /// Create a historical file whose mtime is `age_secs` in the past
        fn historical(&self, cursor: u32, age_secs: u64, compressed: bool) -> String {
            let bucket = Local::now() - chrono::Duration::seconds(age_secs as i64);
            let mut name = self
                .naming
                .historical_name(crate::rotate::clock::bucket_start(bucket, None), cursor);
            if compressed {
                name.push_str(COMPRESS_SUFFIX);
            }
            let path = self.temp_dir.path().join(&name);
            fs::write(&path, format!("record {cursor}\n")).unwrap();
            self.age(&name, age_secs);
            name
        }

        fn age(&self, name: &str, age_secs: u64) {
            File::options()
                .write(true)
                .open(self.temp_dir.path().join(name))
                .unwrap()
                .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
                .unwrap();
        }

        fn exists(&self, name: &str) -> bool {
            self.temp_dir.path().join(name).exists()
        }

        fn names(&self) -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(self.temp_dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
    }

    #[test]
    fn test_history_excludes_live_and_foreign_files() {
        let fx = Fixture::new();
        let a = fx.historical(1, 100, false);
        let b = fx.historical(2, 50, true);
        fs::write(fx.temp_dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(fx.temp_dir.path().join("other.2026_01_01T00_00_00.1.log"), b"x").unwrap();
        fs::create_dir(fx.temp_dir.path().join("app.2026_01_01T00_00_00.9.log")).unwrap();

        let files = history_files(&fx.naming).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec![b.as_str(), a.as_str()]);
    }

    #[test]
    fn test_disabled_policy_is_noop() {
        let fx = Fixture::new();
        let old = fx.historical(1, 400 * DAY, false);
        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log"));

        let report = compact(&fx.naming, &policy, Local::now()).unwrap();
        assert_eq!(report, CompactionReport::default());
        assert!(fx.exists(&old));
    }

    #[test]
    fn test_count_retention_removes_oldest() {
        let fx = Fixture::new();
        let limit = 4;
        let names: Vec<String> = (1..=limit as u32 + 3)
            .map(|cursor| fx.historical(cursor, 1000 - cursor as u64 * 10, false))
            .collect();
        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log")).with_max_count(limit);

        let report = compact(&fx.naming, &policy, Local::now()).unwrap();
        assert_eq!(report.removed.len(), 3);

        // cursors 1..=3 carry the oldest mtimes
        for name in &names[..3] {
            assert!(!fx.exists(name), "{name} should be removed");
        }
        for name in &names[3..] {
            assert!(fx.exists(name), "{name} should be kept");
        }
        assert!(fx.exists("app.log"));
    }

    #[test]
    fn test_count_retention_counts_compressed_pair_once() {
        let fx = Fixture::new();
        let newest = fx.historical(3, 10, false);
        let newest_gz = format!("{newest}{COMPRESS_SUFFIX}");
        fs::write(fx.temp_dir.path().join(&newest_gz), b"gz").unwrap();
        fx.age(&newest_gz, 5);
        let middle = fx.historical(2, 20, true);
        let oldest = fx.historical(1, 30, false);

        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log")).with_max_count(2);
        compact(&fx.naming, &policy, Local::now()).unwrap();

        assert!(fx.exists(&newest));
        assert!(fx.exists(&newest_gz));
        assert!(fx.exists(&middle));
        assert!(!fx.exists(&oldest));
    }

    #[test]
    fn test_count_retention_removes_counterparts_past_limit() {
        let fx = Fixture::new();
        let newest = fx.historical(2, 10, false);
        let old = fx.historical(1, 100, false);
        let old_gz = format!("{old}{COMPRESS_SUFFIX}");
        fs::write(fx.temp_dir.path().join(&old_gz), b"gz").unwrap();
        fx.age(&old_gz, 90);

        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log")).with_max_count(1);
        let report = compact(&fx.naming, &policy, Local::now()).unwrap();

        assert_eq!(report.removed.len(), 2);
        assert!(fx.exists(&newest));
        assert!(!fx.exists(&old));
        assert!(!fx.exists(&old_gz));
    }

    #[test]
    fn test_age_retention_removes_only_expired() {
        let fx = Fixture::new();
        let fresh = fx.historical(1, DAY, false);
        let week_old = fx.historical(2, 6 * DAY, false);
        let expired = fx.historical(3, 8 * DAY, false);
        let ancient = fx.historical(4, 30 * DAY, true);

        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log")).with_max_age_days(7);
        let report = compact(&fx.naming, &policy, Local::now()).unwrap();

        assert_eq!(report.removed.len(), 2);
        assert!(fx.exists(&fresh));
        assert!(fx.exists(&week_old));
        assert!(!fx.exists(&expired));
        assert!(!fx.exists(&ancient));
    }

    #[test]
    fn test_compression_replaces_original() {
        let fx = Fixture::new();
        let name = fx.historical(1, 3600, false);
        let original_mtime = fs::metadata(fx.temp_dir.path().join(&name))
            .unwrap()
            .modified()
            .unwrap();

        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log")).with_compress(true);
        let report = compact(&fx.naming, &policy, Local::now()).unwrap();
        assert_eq!(report.compressed, vec![name.clone()]);

        let gz_path = fx.temp_dir.path().join(format!("{name}{COMPRESS_SUFFIX}"));
        assert!(!fx.exists(&name));
        assert_eq!(fs::metadata(&gz_path).unwrap().modified().unwrap(), original_mtime);

        let mut content = String::new();
        GzDecoder::new(File::open(&gz_path).unwrap())
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "record 1\n");
    }

    #[test]
    fn test_compression_is_idempotent() {
        let fx = Fixture::new();
        fx.historical(1, 300, false);
        fx.historical(2, 200, true);
        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log")).with_compress(true);

        let first = compact(&fx.naming, &policy, Local::now()).unwrap();
        assert_eq!(first.compressed.len(), 1);
        let after_first = fx.names();

        let second = compact(&fx.naming, &policy, Local::now()).unwrap();
        assert!(second.compressed.is_empty());
        assert_eq!(fx.names(), after_first);
        assert!(after_first.iter().all(|n| !n.ends_with(".gz.gz")));
    }

    #[test]
    fn test_failed_compression_keeps_original() {
        let fx = Fixture::new();
        let name = fx.historical(1, 60, false);
        // A directory in the way makes creating the output fail.
        let blocker = fx.temp_dir.path().join(format!("{name}{COMPRESS_SUFFIX}"));
        fs::create_dir(&blocker).unwrap();

        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log")).with_compress(true);
        let report = compact(&fx.naming, &policy, Local::now()).unwrap();

        assert_eq!(report.failed, vec![name.clone()]);
        assert!(fx.exists(&name));
        assert!(blocker.is_dir());
    }

    #[test]
    fn test_unreadable_source_leaves_existing_output() {
        let fx = Fixture::new();
        let name = fx.historical(1, 60, true);
        let missing = fx.temp_dir.path().join(logical_name(&name));

        let err = compress_file(&missing, &fx.temp_dir.path().join(&name)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(
            fs::read_to_string(fx.temp_dir.path().join(&name)).unwrap(),
            "record 1\n"
        );
    }

    #[test]
    fn test_age_retention_applies_alongside_count() {
        let fx = Fixture::new();
        let fresh = fx.historical(4, DAY, false);
        let expired = fx.historical(3, 9 * DAY, false);
        let older = fx.historical(2, 10 * DAY, true);
        let oldest = fx.historical(1, 11 * DAY, false);

        // count alone would keep all three newest
        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log"))
            .with_max_count(3)
            .with_max_age_days(7);
        let report = compact(&fx.naming, &policy, Local::now()).unwrap();

        assert_eq!(report.removed.len(), 3);
        assert!(fx.exists(&fresh));
        assert!(!fx.exists(&expired));
        assert!(!fx.exists(&older));
        assert!(!fx.exists(&oldest));
    }

    #[test]
    fn test_deletion_runs_before_compression() {
        let fx = Fixture::new();
        let keep = fx.historical(2, 10, false);
        let dropped = fx.historical(1, 20, false);
        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log"))
            .with_max_count(1)
            .with_compress(true);

        let report = compact(&fx.naming, &policy, Local::now()).unwrap();
        assert_eq!(report.removed, vec![dropped.clone()]);
        assert_eq!(report.compressed, vec![keep]);
        assert!(!fx.exists(&format!("{dropped}{COMPRESS_SUFFIX}")));
    }

    #[test]
    fn test_plan_retention_without_limits_keeps_everything() {
        let now = Local::now();
        let files = vec![
            HistoricalFile {
                name: "app.a.2.log".to_string(),
                modified: now,
            },
            HistoricalFile {
                name: "app.a.1.log".to_string(),
                modified: now - chrono::Duration::days(365),
            },
        ];
        let policy = RotationPolicy::new("app.log").with_compress(true);
        let plan = plan_retention(files.clone(), &policy, now);
        assert_eq!(plan.keep, files);
        assert!(plan.remove.is_empty());
    }

    #[test]
    fn test_mailbox_coalesces_signals() {
        let (mailbox, mut rx) = Mailbox::channel();
        assert!(mailbox.signal());
        assert!(!mailbox.signal());
        assert!(!mailbox.signal());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(mailbox.signal());
    }

    #[test]
    fn test_mailbox_after_worker_gone() {
        let (mailbox, rx) = Mailbox::channel();
        drop(rx);
        assert!(!mailbox.signal());
    }

    #[test]
    fn test_spawned_worker_runs_pass() {
        let fx = Fixture::new();
        let name = fx.historical(1, 60, false);
        let policy = RotationPolicy::new(fx.temp_dir.path().join("app.log")).with_compress(true);

        let mailbox = spawn(fx.naming.clone(), policy).unwrap();
        assert!(mailbox.signal());

        let gz = format!("{name}{COMPRESS_SUFFIX}");
        for _ in 0..200 {
            if fx.exists(&gz) && !fx.exists(&name) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(fx.exists(&gz));
        assert!(!fx.exists(&name));
    }
}
