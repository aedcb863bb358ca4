//! # Checkpoint — Durable Test State with Rotation and Locking
//!
//! A checkpoint directory holds everything needed to resume a test after a
//! crash, a signal, or a reboot:
//!
//! - `run.lock` — exclusive advisory lock naming the owning process
//! - `chk.cur.pt` — most recent fully written checkpoint
//! - `chk.prev-0.pt` / `chk.prev-1.pt` / `chk.prev-2.pt` — rotated predecessors
//! - `sav.u2.pt` / `sav.near.pt` / `sav.n-1.pt` / `sav.end.pt` — hard-linked
//!   snapshots at i = 2, n − 1024, n − 1 and n
//! - `result.prime.pt` | `result.composite.pt` | `result.error.pt` — at most
//!   one hard-linked copy of the terminal checkpoint
//!
//! ## Write protocol
//!
//! Rotation renames run oldest-first (prev-1 → prev-2, prev-0 → prev-1,
//! cur → prev-0) before the new current is created exclusively, so at every
//! instant at least one complete checkpoint exists if any ever did. A record
//! is complete only if its final line is the sentinel `complete = "true" ;` —
//! readers treat anything else as a torn write and fall back to the next
//! candidate in cur → prev-0 → prev-1 → prev-2 order.
//!
//! ## Record format
//!
//! Line-based `key = value ;` text in calc(1) syntax, so a checkpoint can be
//! fed straight into an arbitrary-precision calculator for inspection. The
//! U term is hex (`u_term = 0x… ;`); stats appear as four named blocks.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use rug::Integer;
use tracing::{debug, info, warn};

use crate::params::RieselParams;
use crate::signals::{self, SignalFlags};
use crate::stats::{PrimeStats, StatsTracker, Timeval};
use crate::{checked_u32, Session, TestError};

/// Checkpoint record format version.
pub const FORMAT_VERSION: u64 = 2;

/// Offset before n at which the near-end snapshot is taken.
pub const PREVIEW: u64 = 1024;

const LOCK_FILE: &str = "run.lock";
const CUR_FILE: &str = "chk.cur.pt";
const PREV_FILES: [&str; 3] = ["chk.prev-0.pt", "chk.prev-1.pt", "chk.prev-2.pt"];
const SAV_U2: &str = "sav.u2.pt";
const SAV_NEAR: &str = "sav.near.pt";
const SAV_N1: &str = "sav.n-1.pt";
const SAV_END: &str = "sav.end.pt";

const DIR_MODE: u32 = 0o770;
const CHECKPOINT_MODE: u32 = 0o440;
const LOCK_MODE: u32 = 0o660;

/// Terminal verdict recorded as a result hard link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Prime,
    Composite,
    Error,
}

impl ResultKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ResultKind::Prime => "result.prime.pt",
            ResultKind::Composite => "result.composite.pt",
            ResultKind::Error => "result.error.pt",
        }
    }
}

/// Checkpoint behavior requested on the command line.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub dir: PathBuf,
    /// Wipe result/save/rolling files before starting a new test.
    pub force_init: bool,
    /// > 0: arm a virtual-time interval timer; 0: checkpoint every term;
    /// < 0: only on demand (signal- or index-driven).
    pub chkpt_secs: i64,
    /// > 0: checkpoint whenever i is a multiple of this.
    pub multiple: u64,
}

/// State restored from a checkpoint record.
#[derive(Debug)]
pub struct RestoredState {
    pub h: u64,
    pub n: u64,
    pub i: u64,
    pub v1: u64,
    pub u: Integer,
    pub restored: PrimeStats,
}

/// An exclusively locked checkpoint directory. The advisory lock is held for
/// the lifetime of this value; dropping it releases the lock and disarms the
/// interval timer on every exit path, including panics.
pub struct CheckpointDir {
    dir: PathBuf,
    _lock: File,
    chkpt_secs: i64,
    multiple: u64,
}

impl CheckpointDir {
    /// Prepare the directory, acquire the lock, install signal handlers and
    /// arm the periodic timer.
    ///
    /// Lock contention is reported as a distinct error from an inaccessible
    /// directory: a second process on the same directory must fail cleanly
    /// without touching the owner's files.
    pub fn setup(cfg: &CheckpointConfig, session: &Session) -> Result<CheckpointDir, TestError> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&cfg.dir)
            .map_err(|source| TestError::CheckpointAccess {
                path: cfg.dir.clone(),
                source,
            })?;
        let dir = cfg
            .dir
            .canonicalize()
            .map_err(|source| TestError::CheckpointAccess {
                path: cfg.dir.clone(),
                source,
            })?;

        check_access(&dir)?;

        // the checkpoint directory becomes the working directory for the
        // rest of the run
        std::env::set_current_dir(&dir).map_err(|source| TestError::CheckpointAccess {
            path: dir.clone(),
            source,
        })?;

        // open without truncation: a losing contender must not clobber the
        // owner's diagnostic metadata
        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(LOCK_MODE)
            .open(&lock_path)
            .map_err(|source| TestError::CheckpointAccess {
                path: lock_path.clone(),
                source,
            })?;

        let rc = unsafe { libc::flock(lock.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(TestError::CheckpointLocked { path: dir });
            }
            return Err(TestError::CheckpointAccess {
                path: lock_path,
                source: err,
            });
        }

        lock.set_len(0)
            .and_then(|()| write_lock_metadata(&lock, &dir, session))
            .map_err(|source| TestError::CheckpointIo {
                context: format!("writing {}", lock_path.display()),
                source,
            })?;

        session.flags.install_handlers();
        if cfg.chkpt_secs > 0 {
            signals::arm_virtual_timer(cfg.chkpt_secs)?;
        }

        let ckpt = CheckpointDir {
            dir,
            _lock: lock,
            chkpt_secs: cfg.chkpt_secs,
            multiple: cfg.multiple,
        };
        if cfg.force_init {
            ckpt.force_init()?;
        }
        info!(dir = %ckpt.dir.display(), chkpt_secs = cfg.chkpt_secs, "checkpoint directory ready");
        Ok(ckpt)
    }

    /// Should a checkpoint be written after finishing term i of n?
    ///
    /// Exactly these conditions trigger one: a pending alarm, a termination
    /// request, the initial term (i = 2), the near-end/penultimate/final
    /// terms, a configured index multiple, or every-term mode.
    pub fn needed(&self, flags: &SignalFlags, i: u64, n: u64) -> bool {
        flags.alarm_pending()
            || flags.end_requested()
            || i == 2
            || i + PREVIEW == n
            || i + 1 == n
            || i == n
            || (self.multiple > 0 && i % self.multiple == 0)
            || self.chkpt_secs == 0
    }

    /// Write a checkpoint for a live test at term i, rotating predecessors
    /// and creating any due save hard links.
    pub fn write(
        &self,
        session: &mut Session,
        params: &RieselParams,
        i: u64,
        v1: u64,
        u: &Integer,
    ) -> Result<(), TestError> {
        let (h, n) = (params.h(), params.n());
        if h < 1 || n < 2 {
            return Err(TestError::Internal(format!(
                "checkpoint of untestable candidate {}*2^{}-1",
                h, n
            )));
        }
        if params.multiple_of_three() {
            return Err(TestError::Internal(format!(
                "checkpoint of multiple-of-3 candidate {}*2^{}-1",
                h, n
            )));
        }
        if i < 2 || i > n {
            return Err(TestError::Internal(format!(
                "checkpoint index i: {} outside [2, {}]",
                i, n
            )));
        }
        if v1 < 3 {
            return Err(TestError::Internal(format!(
                "checkpoint with v1: {} < 3",
                v1
            )));
        }

        session.stats.update();
        self.write_record(session, h, n, i, v1, u)?;
        self.link_saves(i, n)?;
        // the alarm is consumed by the write; checkpoint_and_end stays up
        // so the driver can exit after us
        session.flags.clear_alarm();
        debug!(i, n, "checkpoint written");
        Ok(())
    }

    /// Write a terminal record for a trivially decided candidate (prime or
    /// composite table, multiple-of-3 filter) and link the result file. The
    /// live-test invariants do not apply to these records.
    pub fn write_trivial_result(
        &self,
        session: &mut Session,
        params: &RieselParams,
        kind: ResultKind,
    ) -> Result<(), TestError> {
        session.stats.update();
        self.write_record(
            session,
            params.h(),
            params.n(),
            params.n(),
            0,
            &Integer::new(),
        )?;
        self.link_result(kind)
    }

    /// Hard-link the current checkpoint as the terminal result. Force-init
    /// is the only path that removes terminal files, so an existing result
    /// from an earlier run is left alone with a warning.
    pub fn link_result(&self, kind: ResultKind) -> Result<(), TestError> {
        let target = self.dir.join(kind.file_name());
        match fs::hard_link(self.dir.join(CUR_FILE), &target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(file = kind.file_name(), "result file already present, keeping it");
                Ok(())
            }
            Err(source) => Err(TestError::CheckpointIo {
                context: format!("linking {}", target.display()),
                source,
            }),
        }
    }

    /// Remove result files, save snapshots and rolling checkpoints ahead of
    /// a fresh test. The lock file and unrelated files are untouched.
    pub fn force_init(&self) -> Result<(), TestError> {
        let mut victims: Vec<&str> = vec![CUR_FILE, SAV_U2, SAV_NEAR, SAV_N1, SAV_END];
        victims.extend(PREV_FILES);
        victims.push(ResultKind::Prime.file_name());
        victims.push(ResultKind::Composite.file_name());
        victims.push(ResultKind::Error.file_name());

        for name in victims {
            match fs::remove_file(self.dir.join(name)) {
                Ok(()) => debug!(name, "force-init removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(TestError::CheckpointIo {
                        context: format!("force-init removing {}", name),
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    /// Restore from the newest complete checkpoint, falling back through the
    /// rotation order when a file is missing or torn. A record that parses
    /// but disagrees with the expected test (or carries the wrong format
    /// version) is a fatal restore error, not a fallback.
    pub fn restore(&self, expected: Option<(u64, u64)>) -> Result<RestoredState, TestError> {
        let mut candidates = vec![CUR_FILE];
        candidates.extend(PREV_FILES);

        for name in candidates {
            let path = self.dir.join(name);
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(file = name, error = %e, "skipping unreadable checkpoint");
                    continue;
                }
            };
            let map = match parse_record(&text) {
                Some(map) => map,
                None => {
                    warn!(file = name, "skipping incomplete checkpoint record");
                    continue;
                }
            };
            let state = match extract_state(&map) {
                Some(state) => state,
                None => {
                    warn!(file = name, "skipping malformed checkpoint record");
                    continue;
                }
            };

            let version = get_u64(&map, "version").unwrap_or(0);
            if version != FORMAT_VERSION {
                return Err(TestError::RestoreFailed(format!(
                    "{}: format version {} != {}",
                    name, version, FORMAT_VERSION
                )));
            }
            if let Some((h, n)) = expected {
                if (h, n) != (state.h, state.n) {
                    return Err(TestError::RestoreFailed(format!(
                        "{}: holds {}*2^{}-1, requested {}*2^{}-1",
                        name, state.h, state.n, h, n
                    )));
                }
            }
            info!(file = name, h = state.h, n = state.n, i = state.i, "restored checkpoint");
            return Ok(state);
        }
        Err(TestError::RestoreFailed(
            "no complete checkpoint record found".into(),
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Oldest-first renames so that at any instant before the new current
    /// exists, at least one complete checkpoint remains on disk.
    fn rotate(&self) -> Result<(), TestError> {
        let moves = [
            (PREV_FILES[1], PREV_FILES[2]),
            (PREV_FILES[0], PREV_FILES[1]),
            (CUR_FILE, PREV_FILES[0]),
        ];
        for (from, to) in moves {
            match fs::rename(self.path(from), self.path(to)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(TestError::CheckpointIo {
                        context: format!("rotating {} -> {}", from, to),
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    fn write_record(
        &self,
        session: &Session,
        h: u64,
        n: u64,
        i: u64,
        v1: u64,
        u: &Integer,
    ) -> Result<(), TestError> {
        self.rotate()?;

        let cur = self.path(CUR_FILE);
        let io_err = |context: String| {
            move |source: io::Error| TestError::CheckpointIo { context, source }
        };

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(CHECKPOINT_MODE)
            .open(&cur)
            .map_err(io_err(format!("creating {}", cur.display())))?;
        let mut w = BufWriter::new(file);

        self.write_record_body(&mut w, session, h, n, i, v1, u)
            .map_err(io_err(format!("writing {}", cur.display())))?;

        w.flush()
            .map_err(io_err(format!("flushing {}", cur.display())))?;
        w.get_ref()
            .sync_all()
            .map_err(io_err(format!("syncing {}", cur.display())))?;
        Ok(())
    }

    fn write_record_body<W: Write>(
        &self,
        w: &mut W,
        session: &Session,
        h: u64,
        n: u64,
        i: u64,
        v1: u64,
        u: &Integer,
    ) -> io::Result<()> {
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        write_uint(w, None, "version", FORMAT_VERSION)?;
        write_str_field(w, None, "hostname", &session.hostname)?;
        write_str_field(w, None, "cwd", &cwd)?;
        write_str_field(w, None, "checkpoint_dir", &self.dir.display().to_string())?;
        write_uint(w, None, "pid", session.pid as u64)?;
        write_uint(w, None, "ppid", session.ppid as u64)?;
        write_uint(w, None, "n", n)?;
        write_uint(w, None, "h", h)?;
        write_uint(w, None, "i", i)?;
        write_uint(w, None, "v1", v1)?;
        write_stats_report(w, &session.stats, true)?;
        write_hex(w, None, "u_term", u)?;
        // sentinel: the record is valid only if this is the last line
        write_str_field(w, None, "complete", "true")
    }

    fn link_saves(&self, i: u64, n: u64) -> Result<(), TestError> {
        if i == 2 {
            self.link_save(SAV_U2)?;
        }
        if i + PREVIEW == n {
            self.link_save(SAV_NEAR)?;
        }
        if i + 1 == n {
            self.link_save(SAV_N1)?;
        }
        if i == n {
            self.link_save(SAV_END)?;
        }
        Ok(())
    }

    fn link_save(&self, name: &str) -> Result<(), TestError> {
        match fs::hard_link(self.path(CUR_FILE), self.path(name)) {
            Ok(()) => Ok(()),
            // keep the first snapshot taken at this index
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(source) => Err(TestError::CheckpointIo {
                context: format!("linking {}", name),
                source,
            }),
        }
    }
}

impl Drop for CheckpointDir {
    fn drop(&mut self) {
        // lock released when the file handle closes; timer must not outlive
        // the checkpoint subsystem
        signals::disarm_virtual_timer();
    }
}

fn check_access(dir: &Path) -> Result<(), TestError> {
    let c_path =
        CString::new(dir.as_os_str().as_bytes()).map_err(|_| TestError::CheckpointAccess {
            path: dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"),
        })?;
    for mode in [libc::R_OK, libc::W_OK, libc::X_OK] {
        let rc = unsafe { libc::access(c_path.as_ptr(), mode) };
        if rc != 0 {
            return Err(TestError::CheckpointAccess {
                path: dir.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }
    }
    Ok(())
}

fn write_lock_metadata(lock: &File, dir: &Path, session: &Session) -> io::Result<()> {
    let mut w = BufWriter::new(lock);
    let now = Timeval::now();
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    write_str_field(&mut w, None, "hostname", &session.hostname)?;
    write_uint(&mut w, None, "pid", session.pid as u64)?;
    write_uint(&mut w, None, "ppid", session.ppid as u64)?;
    write_str_field(&mut w, None, "cwd", &cwd)?;
    write_str_field(&mut w, None, "checkpoint_dir", &dir.display().to_string())?;
    write_timeval(&mut w, None, "locked_at", now)?;
    write_date_time(&mut w, None, "locked_at_date", now)?;
    w.flush()
}

// ── record serialization ────────────────────────────────────────────
//
// One writer per value shape, each parameterized by an optional base prefix
// (`total_ru_utime` vs bare `u_term`). Every line is `name = value ;` and
// every write is checked.

fn write_name<W: Write>(w: &mut W, base: Option<&str>, name: &str) -> io::Result<()> {
    match base {
        Some(base) => write!(w, "{}_{}", base, name),
        None => write!(w, "{}", name),
    }
}

fn write_uint<W: Write>(w: &mut W, base: Option<&str>, name: &str, value: u64) -> io::Result<()> {
    write_name(w, base, name)?;
    writeln!(w, " = {} ;", value)
}

fn write_int<W: Write>(w: &mut W, base: Option<&str>, name: &str, value: i64) -> io::Result<()> {
    write_name(w, base, name)?;
    writeln!(w, " = {} ;", value)
}

fn write_str_field<W: Write>(
    w: &mut W,
    base: Option<&str>,
    name: &str,
    value: &str,
) -> io::Result<()> {
    write_name(w, base, name)?;
    writeln!(w, " = \"{}\" ;", value)
}

fn write_timeval<W: Write>(
    w: &mut W,
    base: Option<&str>,
    name: &str,
    value: Timeval,
) -> io::Result<()> {
    write_name(w, base, name)?;
    writeln!(w, " = {} ;", value)
}

fn write_date_time<W: Write>(
    w: &mut W,
    base: Option<&str>,
    name: &str,
    value: Timeval,
) -> io::Result<()> {
    let formatted = chrono::DateTime::from_timestamp(value.sec, (value.usec * 1000) as u32)
        .map(|dt| format!("{} UTC", dt.format("%Y-%m-%d %H:%M:%S")))
        .unwrap_or_else(|| "unrepresentable".to_string());
    write_str_field(w, base, name, &formatted)
}

/// Big-integer hex uses the same checked-write discipline as every other
/// field: prefix, digits, terminator, each verified.
fn write_hex<W: Write>(w: &mut W, base: Option<&str>, name: &str, value: &Integer) -> io::Result<()> {
    write_name(w, base, name)?;
    write!(w, " = 0x")?;
    write!(w, "{:x}", value)?;
    writeln!(w, " ;")
}

fn write_stats_block<W: Write>(w: &mut W, base: &str, stats: &PrimeStats) -> io::Result<()> {
    write_timeval(w, Some(base), "timestamp", stats.timestamp)?;
    write_date_time(w, Some(base), "date_time", stats.timestamp)?;
    write_timeval(w, Some(base), "ru_utime", stats.ru_utime)?;
    write_timeval(w, Some(base), "ru_stime", stats.ru_stime)?;
    write_timeval(w, Some(base), "wall_clock", stats.wall_clock)?;
    write_int(w, Some(base), "ru_maxrss", stats.ru_maxrss)?;
    write_int(w, Some(base), "ru_minflt", stats.ru_minflt)?;
    write_int(w, Some(base), "ru_majflt", stats.ru_majflt)?;
    write_int(w, Some(base), "ru_inblock", stats.ru_inblock)?;
    write_int(w, Some(base), "ru_oublock", stats.ru_oublock)?;
    write_int(w, Some(base), "ru_nvcsw", stats.ru_nvcsw)?;
    write_int(w, Some(base), "ru_nivcsw", stats.ru_nivcsw)
}

/// Dump stats in record syntax: the four named blocks when `extended`,
/// otherwise just the totals. Shared by checkpoint records and the
/// stderr stats report.
pub fn write_stats_report<W: Write>(
    w: &mut W,
    stats: &StatsTracker,
    extended: bool,
) -> io::Result<()> {
    if extended {
        write_stats_block(w, "beginrun", stats.beginrun())?;
        write_stats_block(w, "current", stats.current())?;
        write_stats_block(w, "restored", stats.restored())?;
    }
    write_stats_block(w, "total", stats.total())
}

// ── record parsing ──────────────────────────────────────────────────

/// Parse a record into a key/value map. Returns None unless every line has
/// the `name = value ;` shape and the final line is the completion sentinel.
fn parse_record(text: &str) -> Option<HashMap<String, String>> {
    let trimmed = text.trim_end_matches('\n');
    if trimmed.is_empty() {
        return None;
    }
    let mut map = HashMap::new();
    let mut last_line = "";
    for line in trimmed.lines() {
        let body = line.strip_suffix(" ;")?;
        let (key, value) = body.split_once(" = ")?;
        map.insert(key.to_string(), value.to_string());
        last_line = line;
    }
    if last_line != "complete = \"true\" ;" {
        return None;
    }
    Some(map)
}

fn get_u64(map: &HashMap<String, String>, key: &str) -> Option<u64> {
    map.get(key)?.parse().ok()
}

fn get_i64(map: &HashMap<String, String>, key: &str) -> Option<i64> {
    map.get(key)?.parse().ok()
}

fn get_timeval(map: &HashMap<String, String>, key: &str) -> Option<Timeval> {
    let raw = map.get(key)?;
    let (sec, usec) = raw.split_once('.')?;
    Some(Timeval::new(sec.parse().ok()?, usec.parse().ok()?))
}

fn get_hex(map: &HashMap<String, String>, key: &str) -> Option<Integer> {
    let raw = map.get(key)?.strip_prefix("0x")?;
    Integer::from_str_radix(raw, 16).ok()
}

fn stats_block_from(map: &HashMap<String, String>, base: &str) -> Option<PrimeStats> {
    let key = |name: &str| format!("{}_{}", base, name);
    Some(PrimeStats {
        timestamp: get_timeval(map, &key("timestamp"))?,
        ru_utime: get_timeval(map, &key("ru_utime"))?,
        ru_stime: get_timeval(map, &key("ru_stime"))?,
        wall_clock: get_timeval(map, &key("wall_clock"))?,
        ru_maxrss: get_i64(map, &key("ru_maxrss"))?,
        ru_minflt: get_i64(map, &key("ru_minflt"))?,
        ru_majflt: get_i64(map, &key("ru_majflt"))?,
        ru_inblock: get_i64(map, &key("ru_inblock"))?,
        ru_oublock: get_i64(map, &key("ru_oublock"))?,
        ru_nvcsw: get_i64(map, &key("ru_nvcsw"))?,
        ru_nivcsw: get_i64(map, &key("ru_nivcsw"))?,
    })
}

fn extract_state(map: &HashMap<String, String>) -> Option<RestoredState> {
    let h = get_u64(map, "h")?;
    let n = get_u64(map, "n")?;
    let i = get_u64(map, "i")?;
    let v1 = get_u64(map, "v1")?;
    let u = get_hex(map, "u_term")?;

    // live records always carry v1 >= 3 and a testable candidate; trivial
    // terminal records (v1 = 0) are deliberately not resumable
    if h == 0 || h % 2 == 0 || i < 2 || i > n || v1 < 3 || n > u32::MAX as u64 {
        return None;
    }
    if n < 64 && h >= 1u64 << n {
        return None;
    }
    let candidate = (Integer::from(h) << checked_u32(n)) - 1u32;
    if u < 0u32 || u >= candidate {
        return None;
    }

    let restored = stats_block_from(map, "total").unwrap_or_else(|| {
        warn!("restored record lacks total stats, starting accumulator at zero");
        PrimeStats::default()
    });

    Some(RestoredState {
        h,
        n,
        i,
        v1,
        u,
        restored,
    })
}
