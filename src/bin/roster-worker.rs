//! Isolated scheduling worker.
//!
//! Reads a `ScheduleJob` from `<input>`, runs it and writes the
//! `RosterOutcome` to `<output>`. Logs go to stderr (`RUST_LOG`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use u_roster::scheduler::ScheduleJob;
use u_roster::Result;

#[derive(Debug, Parser)]
#[command(name = "roster-worker", about = "Runs one scheduling job")]
struct Args {
    /// Job file (JSON).
    input: PathBuf,
    /// Result file (JSON).
    output: PathBuf,
}

fn run(input: &Path, output: &Path) -> Result<()> {
    let job: ScheduleJob = serde_json::from_slice(&std::fs::read(input)?)?;
    info!(agents = job.agents.len(), days = job.days, "job loaded");
    let outcome = job.run();
    std::fs::write(output, serde_json::to_vec(&outcome)?)?;
    info!(engine = ?outcome.engine, fallback = outcome.fallback, "result written");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "u_roster=info,roster_worker=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(&args.input, &args.output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "job failed");
            eprintln!("roster-worker: {e}");
            ExitCode::FAILURE
        }
    }
}
