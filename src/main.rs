//! # Main — CLI Entry Point
//!
//! Parses arguments, wires up the optional checkpoint directory and
//! verification-script writer, runs the test and maps the result onto the
//! stable exit-code contract:
//!
//! | code | meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | proven prime                              |
//! | 1    | proven composite                          |
//! | 2    | cannot be tested by this method           |
//! | 4    | checkpoint directory missing/inaccessible |
//! | 5    | checkpoint directory locked               |
//! | 6    | cannot restore                            |
//! | 7    | caught a termination signal, checkpointed |
//! | 8    | help printed                              |
//! | 9    | invalid or incompatible arguments         |
//! | 10+  | internal fatal errors                     |
//!
//! clap's own help/usage handling exits 0/2, so parsing goes through
//! `try_parse` and is remapped.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use rieseltest::calc::CalcScript;
use rieseltest::checkpoint::{self, CheckpointConfig, CheckpointDir, ResultKind};
use rieseltest::llr::{self, Outcome};
use rieseltest::params::RieselParams;
use rieseltest::{Session, TestError};

#[derive(Parser)]
#[command(
    name = "rieseltest",
    about = "Lucas-Lehmer-Riesel primality test for h*2^n-1",
    disable_version_flag = true
)]
struct Cli {
    /// Multiplier h (as in h*2^n-1); omit together with n to restore from
    /// the checkpoint directory
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    h: Option<u64>,

    /// Power of 2 n (as in h*2^n-1)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    n: Option<u64>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write a calc(1) verification script to stdout instead of the verdict
    #[arg(short = 'c', long)]
    calc_verify: bool,

    /// Dump total resource stats to stderr when done
    #[arg(short = 's', long)]
    stats: bool,

    /// Dump all four stats snapshots (beginrun/current/restored/total)
    #[arg(short = 't', long)]
    extended_stats: bool,

    /// Directory for checkpoint files; enables checkpointing and restore
    #[arg(short = 'C', long, value_name = "DIR")]
    checkpoint_dir: Option<PathBuf>,

    /// Remove result, save and rolling checkpoint files before starting
    #[arg(short = 'f', long, requires = "checkpoint_dir")]
    force_init: bool,

    /// Checkpoint every SECS seconds of CPU time (0 = every term)
    #[arg(
        short = 'i',
        long,
        value_name = "SECS",
        requires = "checkpoint_dir",
        value_parser = clap::value_parser!(i64).range(0..)
    )]
    checkpoint_secs: Option<i64>,

    /// Also checkpoint whenever the term index is a multiple of TERMS
    #[arg(
        short = 'm',
        long,
        value_name = "TERMS",
        requires = "checkpoint_dir",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    multiple: Option<u64>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::DisplayHelp => {
            let _ = e.print();
            return ExitCode::from(8);
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(9);
        }
    };

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let code = run(&cli);
    ExitCode::from(code.clamp(0, u8::MAX as i32) as u8)
}

fn run(cli: &Cli) -> i32 {
    let mut session = Session::begin();

    let ckpt_cfg = cli.checkpoint_dir.as_ref().map(|dir| CheckpointConfig {
        dir: dir.clone(),
        force_init: cli.force_init,
        chkpt_secs: cli.checkpoint_secs.unwrap_or(-1),
        multiple: cli.multiple.unwrap_or(0),
    });

    let mut calc = if cli.calc_verify {
        Some(CalcScript::new(std::io::stdout()))
    } else {
        None
    };

    let result = dispatch(cli, ckpt_cfg, &mut calc, &mut session);

    if cli.stats || cli.extended_stats {
        session.stats.update();
        let mut stderr = std::io::stderr().lock();
        let _ = checkpoint::write_stats_report(&mut stderr, &session.stats, cli.extended_stats);
        let _ = stderr.flush();
    }

    match result {
        Ok((params, outcome)) => {
            match outcome {
                Outcome::Prime if !cli.calc_verify => {
                    println!("{} is prime", params.expr());
                }
                Outcome::Composite if !cli.calc_verify => {
                    println!("{} is composite", params.expr());
                }
                Outcome::Interrupted => {
                    info!("terminated by signal after writing a checkpoint");
                }
                _ => {}
            }
            let _ = std::io::stdout().flush();
            outcome.exit_code()
        }
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}

fn dispatch(
    cli: &Cli,
    ckpt_cfg: Option<CheckpointConfig>,
    calc: &mut Option<CalcScript<std::io::Stdout>>,
    session: &mut Session,
) -> Result<(RieselParams, Outcome), TestError> {
    match (cli.h, cli.n) {
        (Some(h), Some(n)) => {
            let params = RieselParams::new(h, n)?;
            let mut ckpt = match &ckpt_cfg {
                Some(cfg) => Some(CheckpointDir::setup(cfg, session)?),
                None => None,
            };
            let result = llr::test(&params, ckpt.as_mut(), calc.as_mut(), session);
            finish(ckpt.as_ref(), result.map(|outcome| (params, outcome)))
        }
        (None, None) => {
            let cfg = ckpt_cfg.ok_or_else(|| {
                TestError::InvalidArgument(
                    "h and n may only be omitted when restoring from --checkpoint-dir".into(),
                )
            })?;
            if cfg.force_init {
                return Err(TestError::InvalidArgument(
                    "--force-init starts a fresh test and requires h and n".into(),
                ));
            }
            let mut ckpt = CheckpointDir::setup(&cfg, session)?;
            let result = llr::resume(&mut ckpt, None, calc.as_mut(), session);
            finish(Some(&ckpt), result)
        }
        _ => Err(TestError::InvalidArgument(
            "h and n must be given together".into(),
        )),
    }
}

/// Record an error terminal result when a checkpoint directory is active,
/// then pass the outcome through.
fn finish(
    ckpt: Option<&CheckpointDir>,
    result: Result<(RieselParams, Outcome), TestError>,
) -> Result<(RieselParams, Outcome), TestError> {
    if result.is_err() {
        if let Some(c) = ckpt {
            // best effort: the current checkpoint, if any, becomes the
            // error result
            let _ = c.link_result(ResultKind::Error);
        }
    }
    result
}
