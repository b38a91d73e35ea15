//! Rotation clock
//!
//! Maps a point in time onto the start of the rotation bucket containing it.

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Timelike};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Source of "now" for the rotating writer
pub trait Clock: Send + Sync {
    /// Current local time
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Compute the start of the bucket containing `t`
///
/// Periods that are a whole number of days align to local midnight so that all
/// rotations of one calendar day share a timestamp. Other periods truncate to a
/// multiple of the period since the Unix epoch. With no period, the bucket is
/// `t` itself at second precision.
pub fn bucket_start(t: DateTime<Local>, period: Option<Duration>) -> DateTime<Local> {
    let secs = match period.map(|p| p.as_secs()) {
        None | Some(0) => return truncate_to_second(t),
        Some(secs) => secs,
    };

    if secs % SECONDS_PER_DAY == 0 {
        return local_midnight(t);
    }

    let period = secs as i64;
    let ts = t.timestamp();
    let floor = ts - ts.rem_euclid(period);
    Local.timestamp_opt(floor, 0).earliest().unwrap_or(t)
}

fn local_midnight(t: DateTime<Local>) -> DateTime<Local> {
    t.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .unwrap_or(t)
}

fn truncate_to_second(t: DateTime<Local>) -> DateTime<Local> {
    t.with_nanosecond(0).unwrap_or(t)
}
