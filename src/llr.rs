//! # LLR — The Primality Test Driver
//!
//! Orchestrates one Lucas–Lehmer–Riesel test:
//!
//! 1. Trivially small candidates are decided from fixed tables, and
//!    multiples of 3 are rejected from (h mod 3, n mod 2) alone.
//! 2. [`crate::lucas`] supplies V(1) and U(2) = V(h) mod N.
//! 3. The loop advances U(i+1) = U(i)² − 2 mod N through
//!    [`crate::shiftadd::ShiftAdd`] for i = 2 … n.
//! 4. N is prime exactly when U(n) = 0.
//!
//! Signal flags are polled once per iteration, after the step completes, so
//! a checkpoint always observes a consistent (i, v1, U). When a termination
//! request arrives the driver writes a final checkpoint and reports
//! [`Outcome::Interrupted`] instead of a verdict.
//!
//! A test can also resume mid-loop from a checkpoint directory, skipping
//! setup entirely.

use std::io::Write;

use rug::Integer;
use tracing::{debug, info};

use crate::calc::CalcScript;
use crate::checkpoint::{CheckpointDir, ResultKind};
use crate::estimate_digits;
use crate::lucas;
use crate::params::RieselParams;
use crate::shiftadd::ShiftAdd;
use crate::{Session, TestError};

/// How a test run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// U(n) = 0: N is prime.
    Prime,
    /// U(n) != 0 (or a trivial filter fired): N is composite.
    Composite,
    /// A termination signal arrived; state was checkpointed and the verdict
    /// is still open.
    Interrupted,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Prime => 0,
            Outcome::Composite => 1,
            Outcome::Interrupted => 7,
        }
    }
}

/// Run a full test from setup to verdict.
pub fn test<W: Write>(
    params: &RieselParams,
    mut ckpt: Option<&mut CheckpointDir>,
    mut calc: Option<&mut CalcScript<W>>,
    session: &mut Session,
) -> Result<Outcome, TestError> {
    // trivially small candidates bypass the Lucas machinery entirely
    if params.is_known_prime() {
        if let Some(c) = calc.as_deref_mut() {
            c.trivial_prime(params).map_err(script_err)?;
        }
        if let Some(c) = ckpt.as_deref_mut() {
            c.write_trivial_result(session, params, ResultKind::Prime)?;
        }
        return Ok(Outcome::Prime);
    }
    if params.is_known_composite() {
        if let Some(c) = calc.as_deref_mut() {
            c.trivial_composite(params).map_err(script_err)?;
        }
        if let Some(c) = ckpt.as_deref_mut() {
            c.write_trivial_result(session, params, ResultKind::Composite)?;
        }
        return Ok(Outcome::Composite);
    }
    if params.multiple_of_three() {
        if let Some(c) = calc.as_deref_mut() {
            c.multiple_of_three(params).map_err(script_err)?;
        }
        if let Some(c) = ckpt.as_deref_mut() {
            c.write_trivial_result(session, params, ResultKind::Composite)?;
        }
        return Ok(Outcome::Composite);
    }

    // the domain check comes after the filters: 5*2^1-1 = 9 is composite
    // by the mod-3 filter, not untestable
    if !params.testable() {
        return Err(TestError::NotTestable(format!(
            "h: {} must be < 2^n: 2^{}",
            params.h(),
            params.n()
        )));
    }

    let mut engine = ShiftAdd::new(params.h(), params.n())?;
    let candidate = engine.modulus().clone();
    info!(
        h = params.h(),
        n = params.n(),
        digits = estimate_digits(&candidate),
        "starting Lucas-Lehmer-Riesel test"
    );

    let v1 = lucas::gen_v1(params.h(), &candidate);
    let u2 = lucas::gen_u2(params.h(), &candidate, v1)?;
    debug!(v1, "lucas setup complete");
    if let Some(c) = calc.as_deref_mut() {
        c.setup(params, &u2).map_err(script_err)?;
    }

    run_loop(params, 2, v1, u2, &mut engine, ckpt, calc, session)
}

/// Resume from the newest complete checkpoint in `ckpt` and run to verdict.
/// Returns the restored parameters so callers can report the right
/// candidate.
pub fn resume<W: Write>(
    ckpt: &mut CheckpointDir,
    expected: Option<(u64, u64)>,
    calc: Option<&mut CalcScript<W>>,
    session: &mut Session,
) -> Result<(RieselParams, Outcome), TestError> {
    let state = ckpt.restore(expected)?;
    session.stats.load_restored(state.restored);

    let params = RieselParams::new(state.h, state.n)
        .map_err(|e| TestError::RestoreFailed(format!("restored candidate invalid: {}", e)))?;
    let mut engine = ShiftAdd::new(params.h(), params.n())?;
    info!(
        h = params.h(),
        n = params.n(),
        i = state.i,
        "resuming Lucas-Lehmer-Riesel test"
    );

    let outcome = run_loop(
        &params,
        state.i,
        state.v1,
        state.u,
        &mut engine,
        Some(ckpt),
        calc,
        session,
    )?;
    Ok((params, outcome))
}

/// The squaring loop from term `i` up to term n, with one flag poll and one
/// checkpoint opportunity per iteration.
#[allow(clippy::too_many_arguments)]
fn run_loop<W: Write>(
    params: &RieselParams,
    mut i: u64,
    v1: u64,
    mut u: Integer,
    engine: &mut ShiftAdd,
    mut ckpt: Option<&mut CheckpointDir>,
    mut calc: Option<&mut CalcScript<W>>,
    session: &mut Session,
) -> Result<Outcome, TestError> {
    let n = params.n();

    // checkpoint the entry state (the i = 2 initial save, or the restored
    // position), and honor a termination request that raced restore
    if let Some(c) = ckpt.as_deref_mut() {
        if c.needed(&session.flags, i, n) {
            c.write(session, params, i, v1, &u)?;
            if session.flags.end_requested() {
                info!(i, "termination requested, state checkpointed");
                return Ok(Outcome::Interrupted);
            }
        }
    }

    while i < n {
        i += 1;
        engine.step(&mut u);
        if let Some(c) = calc.as_deref_mut() {
            c.term(i, engine.square(), &u).map_err(script_err)?;
        }
        if n > 50_000 && (i - 2) % 10_000 == 0 {
            debug!(i, n, "squaring progress");
        }

        // flags are consumed only here, after the step, so any checkpoint
        // sees a consistent (i, v1, U)
        if let Some(sig) = session.flags.unexpected_signal() {
            return Err(TestError::Internal(format!(
                "signal {} reached the checkpoint handler",
                sig
            )));
        }
        if let Some(c) = ckpt.as_deref_mut() {
            if c.needed(&session.flags, i, n) {
                c.write(session, params, i, v1, &u)?;
                if session.flags.end_requested() {
                    info!(i, n, "termination requested, state checkpointed");
                    return Ok(Outcome::Interrupted);
                }
            }
        }
    }

    // h*2^n-1 is prime if and only if u(n) == 0
    let prime = u == 0u32;
    if let Some(c) = calc.as_deref_mut() {
        c.verdict(params, prime).map_err(script_err)?;
    }
    if let Some(c) = ckpt.as_deref_mut() {
        let kind = if prime {
            ResultKind::Prime
        } else {
            ResultKind::Composite
        };
        c.link_result(kind)?;
    }
    info!(
        h = params.h(),
        n = params.n(),
        prime,
        "test complete"
    );
    Ok(if prime {
        Outcome::Prime
    } else {
        Outcome::Composite
    })
}

fn script_err(source: std::io::Error) -> TestError {
    TestError::Internal(format!("writing verification script: {}", source))
}
