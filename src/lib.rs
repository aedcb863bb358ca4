//! # Rieseltest — Core Library
//!
//! Decides the primality of N = h·2^n − 1 (Riesel candidates, with the
//! Mersenne case h = 1 as a subcase) using the Lucas–Lehmer–Riesel iteration
//! U(i+1) = U(i)² − 2 (mod N), and persists progress so that multi-day tests
//! survive signals and process restarts.
//!
//! ## Module Organization
//!
//! **Engine modules** (the mathematics):
//! - [`params`] — candidate normalization and trivial-case tables
//! - [`lucas`] — V(1) selection via Jacobi conditions, U(2) = V(h) ladder
//! - [`shiftadd`] — the (U² − 2) mod h·2^n − 1 step via shift-and-add reduction
//! - [`llr`] — the test driver: setup, squaring loop, verdict
//!
//! **Infrastructure modules** (durability, accounting):
//! - [`checkpoint`] — lock, rotation, save/result hard links, restore
//! - [`signals`] — checkpoint flags raised by SIGALRM/SIGVTALRM/SIGINT/SIGHUP
//! - [`stats`] — resource-usage snapshots (beginrun/current/restored/total)
//! - [`calc`] — optional self-checking verification script for calc(1)
//!
//! ## Design Philosophy
//!
//! The compute loop is single-threaded and never divides by N: the reduction
//! exploits the shape of the modulus with bit shifts and one small division
//! by h. Everything that can lose work — signals, crashes between writes,
//! partially written files — is pushed into the checkpoint module, which
//! rotates files so that a complete record survives every failure window.

pub mod calc;
pub mod checkpoint;
pub mod llr;
pub mod lucas;
pub mod params;
pub mod shiftadd;
pub mod signals;
pub mod stats;

use std::fmt;
use std::io;
use std::path::PathBuf;

use rug::Integer;

use crate::signals::SignalFlags;
use crate::stats::StatsTracker;

/// Convert a `u64` bit count to `u32` for `rug` shift operations, panicking
/// with a clear message if the value exceeds `u32::MAX`. This prevents silent
/// truncation that would build the wrong candidate and test the wrong number.
#[inline]
pub fn checked_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or_else(|_| {
        panic!(
            "exponent {} exceeds u32::MAX ({}); candidate would be silently wrong",
            n,
            u32::MAX
        )
    })
}

/// Estimate decimal digit count from bit length, avoiding an expensive
/// to_string conversion on multi-megabit candidates.
#[inline]
pub fn estimate_digits(n: &Integer) -> u64 {
    let bits = n.significant_bits();
    if bits == 0 {
        return 1;
    }
    (bits as f64 * std::f64::consts::LOG10_2) as u64 + 1
}

/// Everything that can go wrong during a test, mapped onto the stable
/// exit-code contract. Engine modules (`lucas`, `shiftadd`) never fail
/// operationally; their precondition violations surface as `Internal`.
#[derive(Debug)]
pub enum TestError {
    /// Invalid or incompatible arguments (exit 9).
    InvalidArgument(String),
    /// The candidate cannot be tested by this method, e.g. h >= 2^n after
    /// normalization (exit 2).
    NotTestable(String),
    /// Checkpoint directory missing or inaccessible (exit 4).
    CheckpointAccess { path: PathBuf, source: io::Error },
    /// Checkpoint directory locked by another process (exit 5).
    CheckpointLocked { path: PathBuf },
    /// Write or rename failure inside an accessible checkpoint directory —
    /// disk full or a bug, not an expected operational state (exit 11).
    CheckpointIo { context: String, source: io::Error },
    /// No complete checkpoint could be restored, or the restored record
    /// disagrees with the requested test (exit 6).
    RestoreFailed(String),
    /// Violated precondition or impossible state — a bug (exit 10).
    Internal(String),
}

impl TestError {
    /// Map onto the documented exit-code contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            TestError::NotTestable(_) => 2,
            TestError::CheckpointAccess { .. } => 4,
            TestError::CheckpointLocked { .. } => 5,
            TestError::RestoreFailed(_) => 6,
            TestError::InvalidArgument(_) => 9,
            TestError::Internal(_) => 10,
            TestError::CheckpointIo { .. } => 11,
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            TestError::NotTestable(msg) => write!(f, "cannot test: {}", msg),
            TestError::CheckpointAccess { path, source } => {
                write!(
                    f,
                    "checkpoint directory {} inaccessible: {}",
                    path.display(),
                    source
                )
            }
            TestError::CheckpointLocked { path } => {
                write!(
                    f,
                    "checkpoint directory {} locked by another process",
                    path.display()
                )
            }
            TestError::CheckpointIo { context, source } => {
                write!(f, "checkpoint I/O failure ({}): {}", context, source)
            }
            TestError::RestoreFailed(msg) => write!(f, "cannot restore: {}", msg),
            TestError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for TestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TestError::CheckpointAccess { source, .. } => Some(source),
            TestError::CheckpointIo { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Long-lived per-process state owned by the driver: stats snapshots, the
/// signal-flag handle, and the identification strings written into lock
/// files and checkpoint records. Created once at startup; signal handlers
/// touch only the module-private flag counters behind [`SignalFlags`].
pub struct Session {
    pub stats: StatsTracker,
    pub flags: SignalFlags,
    pub hostname: String,
    pub pid: u32,
    pub ppid: u32,
}

impl Session {
    /// Capture begin-of-run stats and process identity. Does not install
    /// signal handlers — that happens when a checkpoint directory is set up.
    pub fn begin() -> Session {
        Session {
            stats: StatsTracker::start(),
            flags: SignalFlags::new(),
            hostname: hostname(),
            pid: std::process::id(),
            ppid: unsafe { libc::getppid() } as u32,
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string())
}
