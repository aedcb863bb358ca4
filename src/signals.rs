//! # Signals — Checkpoint Flags and the Virtual-Time Interval Timer
//!
//! The compute loop cannot be interrupted mid-squaring, so signals only set
//! flags that the driver polls once per iteration:
//!
//! - SIGALRM and SIGVTALRM raise `checkpoint_alarm`: checkpoint, continue.
//! - SIGINT and SIGHUP raise `checkpoint_and_end`: checkpoint, then exit.
//! - Any other signal reaching the handler is recorded and turned into a
//!   fatal error by the main flow.
//!
//! Both counters are monotone; wrap-around clamps back to 1 so a raised flag
//! can never read as zero. The handler touches nothing but these atomics —
//! no locks, no allocation, no big-integer work.
//!
//! Handlers are installed exactly once, when the checkpoint subsystem comes
//! up. The periodic wake-up is an ITIMER_VIRTUAL interval timer, so a test
//! that is descheduled does not burn checkpoints it did not earn.

use std::mem;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Once;

use crate::TestError;

static CHECKPOINT_ALARM: AtomicU64 = AtomicU64::new(0);
static CHECKPOINT_AND_END: AtomicU64 = AtomicU64::new(0);
static UNEXPECTED_SIGNAL: AtomicI32 = AtomicI32::new(0);
static INSTALL: Once = Once::new();

extern "C" fn record_signal(signum: libc::c_int) {
    // async-signal-safe: atomic stores only
    match signum {
        libc::SIGALRM | libc::SIGVTALRM => bump(&CHECKPOINT_ALARM),
        libc::SIGINT | libc::SIGHUP => bump(&CHECKPOINT_AND_END),
        other => UNEXPECTED_SIGNAL.store(other, Ordering::Relaxed),
    }
}

fn bump(counter: &AtomicU64) {
    // wrap-around clamps to 1 so the flag stays raised
    if counter.fetch_add(1, Ordering::Relaxed) == u64::MAX {
        counter.store(1, Ordering::Relaxed);
    }
}

/// Handle to the module-private flag counters. All reads and the
/// checkpoint-side clear go through this type; only the installed handler
/// writes from signal context.
pub struct SignalFlags {
    _private: (),
}

impl SignalFlags {
    pub fn new() -> SignalFlags {
        SignalFlags { _private: () }
    }

    /// Install the four handlers. Idempotent; the underlying registration
    /// happens exactly once per process.
    pub fn install_handlers(&self) {
        INSTALL.call_once(|| unsafe {
            libc::signal(libc::SIGALRM, record_signal as *const () as libc::sighandler_t);
            libc::signal(
                libc::SIGVTALRM,
                record_signal as *const () as libc::sighandler_t,
            );
            libc::signal(libc::SIGINT, record_signal as *const () as libc::sighandler_t);
            libc::signal(libc::SIGHUP, record_signal as *const () as libc::sighandler_t);
        });
    }

    /// A periodic or virtual-time alarm fired since the last checkpoint.
    pub fn alarm_pending(&self) -> bool {
        CHECKPOINT_ALARM.load(Ordering::Relaxed) != 0
    }

    /// A termination request (SIGINT/SIGHUP) arrived: checkpoint and exit.
    pub fn end_requested(&self) -> bool {
        CHECKPOINT_AND_END.load(Ordering::Relaxed) != 0
    }

    /// A signal the handler was never registered for. Indicates a bug in
    /// handler setup; the driver treats it as fatal.
    pub fn unexpected_signal(&self) -> Option<i32> {
        match UNEXPECTED_SIGNAL.load(Ordering::Relaxed) {
            0 => None,
            sig => Some(sig),
        }
    }

    /// Cleared only after a successful checkpoint write.
    pub fn clear_alarm(&self) {
        CHECKPOINT_ALARM.store(0, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn reset_for_tests(&self) {
        CHECKPOINT_ALARM.store(0, Ordering::Relaxed);
        CHECKPOINT_AND_END.store(0, Ordering::Relaxed);
        UNEXPECTED_SIGNAL.store(0, Ordering::Relaxed);
    }
}

impl Default for SignalFlags {
    fn default() -> Self {
        SignalFlags::new()
    }
}

/// Arm the virtual-time interval timer to fire every `secs` seconds of
/// consumed CPU time.
pub fn arm_virtual_timer(secs: i64) -> Result<(), TestError> {
    let timer = libc::itimerval {
        it_interval: libc::timeval {
            tv_sec: secs as libc::time_t,
            tv_usec: 0,
        },
        it_value: libc::timeval {
            tv_sec: secs as libc::time_t,
            tv_usec: 0,
        },
    };
    let rc = unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(TestError::Internal(format!(
            "setitimer(ITIMER_VIRTUAL, {}s) failed: {}",
            secs,
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Disarm the interval timer. Safe on every exit path, armed or not.
pub fn disarm_virtual_timer() {
    let timer: libc::itimerval = unsafe { mem::zeroed() };
    unsafe {
        libc::setitimer(libc::ITIMER_VIRTUAL, &timer, std::ptr::null_mut());
    }
}
