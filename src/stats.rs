//! # Stats — Resource-Usage Accounting Across Process Lifetimes
//!
//! A long test accumulates CPU time over several process invocations. Four
//! snapshots make the arithmetic restart-safe:
//!
//! - `beginrun` — captured once when the process starts,
//! - `current` — refreshed on every update,
//! - `restored` — totals carried over from a restored checkpoint (zero on a
//!   fresh start),
//! - `total` — derived as restored + (current − beginrun), component-wise.
//!
//! If the system clock or kernel accounting regresses, the negative delta is
//! clamped to zero with a warning; accounting noise must never abort a test.
//! Max RSS is a running maximum, not a sum.

use std::fmt;
use std::mem;

use tracing::warn;

/// Seconds and microseconds, the resolution getrusage and gettimeofday
/// provide. Always normalized: 0 <= usec < 1_000_000.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timeval {
    pub sec: i64,
    pub usec: i64,
}

impl Timeval {
    pub fn new(sec: i64, usec: i64) -> Timeval {
        Timeval { sec, usec }
    }

    /// Current wall-clock time since the epoch.
    pub fn now() -> Timeval {
        let mut tv: libc::timeval = unsafe { mem::zeroed() };
        let rc = unsafe { libc::gettimeofday(&mut tv, std::ptr::null_mut()) };
        if rc != 0 {
            warn!("gettimeofday failed, using zero time");
            return Timeval::default();
        }
        Timeval::from_libc(tv)
    }

    pub fn from_libc(tv: libc::timeval) -> Timeval {
        Timeval {
            sec: tv.tv_sec as i64,
            usec: tv.tv_usec as i64,
        }
    }

    /// self − other, or None when the difference would be negative.
    pub fn checked_sub(self, other: Timeval) -> Option<Timeval> {
        if self < other {
            return None;
        }
        let mut sec = self.sec - other.sec;
        let mut usec = self.usec - other.usec;
        if usec < 0 {
            sec -= 1;
            usec += 1_000_000;
        }
        Some(Timeval { sec, usec })
    }

    pub fn add(self, other: Timeval) -> Timeval {
        let mut sec = self.sec + other.sec;
        let mut usec = self.usec + other.usec;
        if usec >= 1_000_000 {
            sec += 1;
            usec -= 1_000_000;
        }
        Timeval { sec, usec }
    }
}

impl fmt::Display for Timeval {
    /// The `sec.usec` form used in checkpoint records.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}

/// One snapshot of process resource usage, mirroring the fields of
/// getrusage(2) that matter for a compute-bound test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimeStats {
    pub timestamp: Timeval,
    pub ru_utime: Timeval,
    pub ru_stime: Timeval,
    pub wall_clock: Timeval,
    pub ru_maxrss: i64,
    pub ru_minflt: i64,
    pub ru_majflt: i64,
    pub ru_inblock: i64,
    pub ru_oublock: i64,
    pub ru_nvcsw: i64,
    pub ru_nivcsw: i64,
}

impl PrimeStats {
    /// Snapshot the process right now. Failures degrade to zeroed fields
    /// with a warning; accounting never aborts the test.
    pub fn capture() -> PrimeStats {
        let mut stats = PrimeStats {
            timestamp: Timeval::now(),
            ..PrimeStats::default()
        };

        let mut usage: libc::rusage = unsafe { mem::zeroed() };
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        if rc != 0 {
            warn!("getrusage failed, resource fields zeroed");
            return stats;
        }

        stats.ru_utime = Timeval::from_libc(usage.ru_utime);
        stats.ru_stime = Timeval::from_libc(usage.ru_stime);
        stats.ru_maxrss = usage.ru_maxrss as i64;
        stats.ru_minflt = usage.ru_minflt as i64;
        stats.ru_majflt = usage.ru_majflt as i64;
        stats.ru_inblock = usage.ru_inblock as i64;
        stats.ru_oublock = usage.ru_oublock as i64;
        stats.ru_nvcsw = usage.ru_nvcsw as i64;
        stats.ru_nivcsw = usage.ru_nivcsw as i64;
        stats
    }
}

/// The four snapshots plus the derivation rules between them.
pub struct StatsTracker {
    beginrun: PrimeStats,
    current: PrimeStats,
    restored: PrimeStats,
    total: PrimeStats,
}

impl StatsTracker {
    /// Capture beginrun and zero the restored accumulator. The restored
    /// timestamp and max RSS start from beginrun so a never-restored test
    /// still reports sensible values.
    pub fn start() -> StatsTracker {
        let beginrun = PrimeStats::capture();
        let mut restored = PrimeStats::default();
        restored.timestamp = beginrun.timestamp;
        restored.ru_maxrss = beginrun.ru_maxrss;
        StatsTracker {
            beginrun,
            current: beginrun,
            restored,
            total: restored,
        }
    }

    /// Load totals carried over from a restored checkpoint.
    pub fn load_restored(&mut self, restored: PrimeStats) {
        self.restored = restored;
        self.total = restored;
    }

    /// Refresh current and re-derive total = restored + (current − beginrun).
    /// Time deltas that would go negative are clamped to zero with a warning.
    pub fn update(&mut self) {
        self.current = PrimeStats::capture();
        self.total.timestamp = self.current.timestamp;

        let utime_delta = clamped_delta(self.current.ru_utime, self.beginrun.ru_utime, "user CPU");
        self.total.ru_utime = self.restored.ru_utime.add(utime_delta);

        let stime_delta =
            clamped_delta(self.current.ru_stime, self.beginrun.ru_stime, "system CPU");
        self.total.ru_stime = self.restored.ru_stime.add(stime_delta);

        // wall clock for this run is derived from the timestamps; the
        // current snapshot keeps it only as a convenience
        let wall_delta = clamped_delta(
            self.current.timestamp,
            self.beginrun.timestamp,
            "wall clock",
        );
        self.current.wall_clock = wall_delta;
        self.total.wall_clock = self.restored.wall_clock.add(wall_delta);

        if self.current.ru_maxrss > self.total.ru_maxrss {
            self.total.ru_maxrss = self.current.ru_maxrss;
        }

        self.total.ru_minflt =
            self.current.ru_minflt - self.beginrun.ru_minflt + self.restored.ru_minflt;
        self.total.ru_majflt =
            self.current.ru_majflt - self.beginrun.ru_majflt + self.restored.ru_majflt;
        self.total.ru_inblock =
            self.current.ru_inblock - self.beginrun.ru_inblock + self.restored.ru_inblock;
        self.total.ru_oublock =
            self.current.ru_oublock - self.beginrun.ru_oublock + self.restored.ru_oublock;
        self.total.ru_nvcsw =
            self.current.ru_nvcsw - self.beginrun.ru_nvcsw + self.restored.ru_nvcsw;
        self.total.ru_nivcsw =
            self.current.ru_nivcsw - self.beginrun.ru_nivcsw + self.restored.ru_nivcsw;
    }

    pub fn beginrun(&self) -> &PrimeStats {
        &self.beginrun
    }

    pub fn current(&self) -> &PrimeStats {
        &self.current
    }

    pub fn restored(&self) -> &PrimeStats {
        &self.restored
    }

    pub fn total(&self) -> &PrimeStats {
        &self.total
    }
}

fn clamped_delta(current: Timeval, begin: Timeval, what: &str) -> Timeval {
    match current.checked_sub(begin) {
        Some(delta) => delta,
        None => {
            warn!("{} time went backwards, assuming 0 difference", what);
            Timeval::default()
        }
    }
}
