//! Checkpoint integration tests: resume identity, lock contention,
//! signal-driven interruption and force-init, exercising the real binary
//! against real directories.
//!
//! All file system state lives in `tempfile::TempDir` — no test touches a
//! shared location. Tests that need a second process spawn the compiled
//! binary via `CARGO_BIN_EXE_rieseltest`.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use rug::Integer;
use tempfile::TempDir;

use rieseltest::checkpoint::{CheckpointConfig, CheckpointDir};
use rieseltest::llr;
use rieseltest::lucas;
use rieseltest::params::RieselParams;
use rieseltest::shiftadd::ShiftAdd;
use rieseltest::Session;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rieseltest"))
}

fn config(dir: &Path) -> CheckpointConfig {
    CheckpointConfig {
        dir: dir.to_path_buf(),
        force_init: false,
        chkpt_secs: -1,
        multiple: 0,
    }
}

/// Run the squaring loop in-process up to term `stop`, returning (v1, U).
fn partial_run(h: u64, n: u64, stop: u64) -> (u64, Integer) {
    let params = RieselParams::new(h, n).unwrap();
    let mut engine = ShiftAdd::new(params.h(), params.n()).unwrap();
    let candidate = engine.modulus().clone();
    let v1 = lucas::gen_v1(params.h(), &candidate);
    let mut u = lucas::gen_u2(params.h(), &candidate, v1).unwrap();
    let mut i = 2;
    while i < stop {
        i += 1;
        engine.step(&mut u);
    }
    (v1, u)
}

fn read_u_term(path: &Path) -> Integer {
    let text = fs::read_to_string(path).unwrap();
    let line = text
        .lines()
        .find(|l| l.starts_with("u_term = 0x"))
        .unwrap_or_else(|| panic!("no u_term in {}", path.display()));
    let hex = line
        .strip_prefix("u_term = 0x")
        .unwrap()
        .strip_suffix(" ;")
        .unwrap();
    Integer::from_str_radix(hex, 16).unwrap()
}

// --- Resume identity (the restored run must match an uninterrupted one) ---

#[test]
fn resume_reaches_the_same_sequence_values() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");

    // first process: run M127 to term 60, checkpoint, stop
    {
        let mut session = Session::begin();
        let ckpt = CheckpointDir::setup(&config(&dir), &session).unwrap();
        let params = RieselParams::new(1, 127).unwrap();
        let (v1, u) = partial_run(1, 127, 60);
        ckpt.write(&mut session, &params, 60, v1, &u).unwrap();
    } // lock released

    // second process: restore (no h/n on the command line) and finish
    let output = bin()
        .args(["-C", dir.to_str().unwrap()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "1 * 2 ^ 127 - 1 is prime\n"
    );

    // the resumed run's U at n-1 and n must equal an uninterrupted run's
    let (_, u_penultimate) = partial_run(1, 127, 126);
    assert_eq!(read_u_term(&dir.join("sav.n-1.pt")), u_penultimate);
    assert_eq!(read_u_term(&dir.join("sav.end.pt")), Integer::new());
    assert!(dir.join("result.prime.pt").exists());
}

#[test]
fn resume_of_composite_run_matches() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");

    // 3*2^100-1: h = 0 mod 3 so no filter; composite
    {
        let mut session = Session::begin();
        let ckpt = CheckpointDir::setup(&config(&dir), &session).unwrap();
        let params = RieselParams::new(3, 100).unwrap();
        let (v1, u) = partial_run(3, 100, 40);
        ckpt.write(&mut session, &params, 40, v1, &u).unwrap();
    }

    let output = bin().args(["-C", dir.to_str().unwrap()]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "3 * 2 ^ 100 - 1 is composite\n"
    );

    let (_, u_final) = partial_run(3, 100, 100);
    assert_eq!(read_u_term(&dir.join("sav.end.pt")), u_final);
    assert!(dir.join("result.composite.pt").exists());
}

// --- Every-term checkpointing produces the full file set ---

#[test]
fn every_term_mode_creates_saves_and_result() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");

    let output = bin()
        .args(["-C", dir.to_str().unwrap(), "-i", "0", "1", "127"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    for name in [
        "run.lock",
        "chk.cur.pt",
        "chk.prev-0.pt",
        "chk.prev-1.pt",
        "chk.prev-2.pt",
        "sav.u2.pt",
        "sav.n-1.pt",
        "sav.end.pt",
        "result.prime.pt",
    ] {
        assert!(dir.join(name).exists(), "{} missing", name);
    }
    // n = 127 < 1024: no near-end snapshot for short runs
    assert!(!dir.join("sav.near.pt").exists());
}

// --- Lock contention ---

#[test]
fn second_process_exits_five_and_leaves_files_alone() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");

    let mut session = Session::begin();
    let ckpt = CheckpointDir::setup(&config(&dir), &session).unwrap();
    let params = RieselParams::new(3, 300).unwrap();
    let (v1, u) = partial_run(3, 300, 50);
    ckpt.write(&mut session, &params, 50, v1, &u).unwrap();
    let cur_before = fs::read_to_string(dir.join("chk.cur.pt")).unwrap();
    let lock_before = fs::read_to_string(dir.join("run.lock")).unwrap();

    let output = bin()
        .args(["-C", dir.to_str().unwrap(), "3", "300"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(5), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(fs::read_to_string(dir.join("chk.cur.pt")).unwrap(), cur_before);
    assert_eq!(fs::read_to_string(dir.join("run.lock")).unwrap(), lock_before);
    drop(ckpt);
}

// --- Signal-driven interruption ---

#[test]
fn sigint_checkpoints_and_exits_seven() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");

    // large enough that the test is still squaring when the signal lands
    let mut child = bin()
        .args(["-C", dir.to_str().unwrap(), "1", "500009"])
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(700));
    unsafe {
        libc::kill(child.id() as i32, libc::SIGINT);
    }
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(7));

    // the interrupt-time state must be restorable
    let mut session = Session::begin();
    let ckpt = CheckpointDir::setup(&config(&dir), &session).unwrap();
    let state = ckpt.restore(Some((1, 500009))).unwrap();
    assert!(state.i >= 2 && state.i < 500009, "interrupted at i = {}", state.i);
    assert!(state.u < ckpt_candidate(1, 500009));
    assert!(!dir.join("result.prime.pt").exists());
    assert!(!dir.join("result.composite.pt").exists());
}

fn ckpt_candidate(h: u64, n: u64) -> Integer {
    RieselParams::new(h, n).unwrap().candidate()
}

// --- Restore picks up exactly where the interrupt left off ---

#[test]
fn interrupted_state_continues_to_the_right_answer() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");

    // simulate an interrupt at an arbitrary term of 9*2^43-1 (prime)
    {
        let mut session = Session::begin();
        let ckpt = CheckpointDir::setup(&config(&dir), &session).unwrap();
        let params = RieselParams::new(9, 43).unwrap();
        let (v1, u) = partial_run(9, 43, 17);
        ckpt.write(&mut session, &params, 17, v1, &u).unwrap();
    }

    let output = bin().args(["-C", dir.to_str().unwrap()]).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "9 * 2 ^ 43 - 1 is prime\n"
    );
}

// --- Force-init ---

#[test]
fn force_init_clears_previous_result_for_a_new_test() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");

    let output = bin()
        .args(["-C", dir.to_str().unwrap(), "3", "3"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert!(dir.join("result.prime.pt").exists());

    // a fresh test in the same directory: -f wipes the old terminal state
    let output = bin()
        .args(["-C", dir.to_str().unwrap(), "-f", "3", "5"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1)); // 95 = 5 * 19
    assert!(!dir.join("result.prime.pt").exists());
    assert!(dir.join("result.composite.pt").exists());
}

#[test]
fn restore_from_empty_directory_exits_six() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");
    fs::create_dir_all(&dir).unwrap();

    let output = bin().args(["-C", dir.to_str().unwrap()]).output().unwrap();
    assert_eq!(output.status.code(), Some(6));
}

// --- In-library resume equivalence (scenario 7 at the API level) ---

#[test]
fn library_resume_matches_uninterrupted_run() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ck");

    let params = RieselParams::new(3, 130).unwrap();
    let uninterrupted = {
        let mut session = Session::begin();
        llr::test::<std::io::Sink>(&params, None, None, &mut session).unwrap()
    };

    {
        let mut session = Session::begin();
        let ckpt = CheckpointDir::setup(&config(&dir), &session).unwrap();
        let (v1, u) = partial_run(3, 130, 77);
        ckpt.write(&mut session, &params, 77, v1, &u).unwrap();
    }

    let mut session = Session::begin();
    let mut ckpt = CheckpointDir::setup(&config(&dir), &session).unwrap();
    let (restored_params, outcome) =
        llr::resume::<std::io::Sink>(&mut ckpt, None, None, &mut session).unwrap();
    assert_eq!(restored_params, params);
    assert_eq!(outcome, uninterrupted);
}
