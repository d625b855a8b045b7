//! Bounded execution of a scheduling job.
//!
//! A [`BoundedWorker`] takes a serializable [`ScheduleJob`] and returns its
//! [`RosterOutcome`], a time-out, or a failure carrying the diagnostic
//! output. Two isolation levels:
//!
//! - [`ThreadWorker`]: a dedicated thread; panics are caught. On time-out
//!   the solver is cancelled and the thread finishes with the greedy
//!   fallback, unobserved.
//! - [`ProcessWorker`]: a `roster-worker` child process with JSON files for
//!   handoff; killed on time-out.

use std::any::Any;
use std::fs;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use super::{RosterOutcome, ScheduleJob};
use crate::cp::CancelToken;
use crate::error::{Result, RosterError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs a job under a wall-clock limit.
pub trait BoundedWorker {
    /// Runs `job`, returning its outcome or a time-out/failure error.
    fn run(&self, job: ScheduleJob) -> Result<RosterOutcome>;

    /// Wall-clock limit.
    fn timeout(&self) -> Duration;
}

/// Runs jobs on a dedicated thread.
#[derive(Debug, Clone)]
pub struct ThreadWorker {
    timeout: Duration,
}

impl ThreadWorker {
    /// Creates a worker with the given limit.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl BoundedWorker for ThreadWorker {
    fn run(&self, job: ScheduleJob) -> Result<RosterOutcome> {
        self.run_with_token(job, CancelToken::new())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ThreadWorker {
    /// Runs `job`, setting `cancel` when the limit passes.
    fn run_with_token(&self, job: ScheduleJob, cancel: CancelToken) -> Result<RosterOutcome> {
        let (tx, rx) = mpsc::channel();
        let token = cancel.clone();
        thread::Builder::new()
            .name("roster-worker".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| job.run_cancellable(token)));
                // the receiver is gone after a time-out
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(payload)) => Err(RosterError::WorkerPanicked {
                message: panic_message(payload.as_ref()),
            }),
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                warn!(seconds = self.timeout.as_secs(), "worker thread timed out, solver cancelled");
                Err(RosterError::WorkerTimedOut {
                    seconds: self.timeout.as_secs(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(RosterError::WorkerPanicked {
                message: "worker exited without a result".to_string(),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs jobs in a `roster-worker` child process.
///
/// The job is written to `<dir>/roster-job-<uuid>.json`, the program is
/// started as `program <input> <output>`, and the outcome is read back
/// from `<dir>/roster-result-<uuid>.json`. Both files are removed afterwards.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    work_dir: PathBuf,
}

impl ProcessWorker {
    /// Creates a worker for `program`, exchanging files in the temp directory.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
            work_dir: std::env::temp_dir(),
        }
    }

    /// Arguments placed before the input and output paths.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Exchanges files in `dir` instead.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    fn execute(&self, input: &Path, output: &Path) -> Result<RosterOutcome> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        debug!(program = %self.program.display(), pid = child.id(), "worker process started");

        // drained concurrently so a chatty child never blocks on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });
        let status = match self.wait(&mut child)? {
            Some(status) => status,
            None => {
                warn!(seconds = self.timeout.as_secs(), "worker process timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                // grandchildren may still hold the pipe; the reader is left detached
                drop(stderr);
                return Err(RosterError::WorkerTimedOut {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let diagnostic = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        if !status.success() {
            return Err(RosterError::WorkerFailed {
                status: status.to_string(),
                diagnostic,
            });
        }

        let bytes = fs::read(output).map_err(|e| RosterError::WorkerFailed {
            status: status.to_string(),
            diagnostic: format!("missing result file: {e}\n{diagnostic}"),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| RosterError::WorkerFailed {
            status: status.to_string(),
            diagnostic: format!("unreadable result file: {e}\n{diagnostic}"),
        })
    }

    /// Polls the child until it exits or the deadline passes (`None`).
    fn wait(&self, child: &mut Child) -> Result<Option<std::process::ExitStatus>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl BoundedWorker for ProcessWorker {
    fn run(&self, job: ScheduleJob) -> Result<RosterOutcome> {
        let id = Uuid::new_v4();
        let input = self.work_dir.join(format!("roster-job-{id}.json"));
        let output = self.work_dir.join(format!("roster-result-{id}.json"));

        fs::write(&input, serde_json::to_vec(&job)?)?;
        let result = self.execute(&input, &output);
        let _ = fs::remove_file(&input);
        let _ = fs::remove_file(&output);
        result
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, Contract, DayWindow, DemandForecast, WeeklyAvailability};
    use chrono::{NaiveDate, Weekday};

    fn job() -> ScheduleJob {
        let agent = Agent::new("A1", "ES")
            .with_contract(Contract::weekly(56.0).with_days_per_week(7))
            .with_windows(WeeklyAvailability::new().with_day(Weekday::Mon, DayWindow::continuous(480, 960)));
        let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        ScheduleJob::new(vec![agent], DemandForecast::new(), start, 1)
    }

    #[test]
    fn test_thread_worker_returns_outcome() {
        let outcome = ThreadWorker::new(Duration::from_secs(30)).run(job()).unwrap();
        assert_eq!(outcome.schedule.agent_count(), 1);
        assert!(outcome.schedule.agent("A1").unwrap().is_active());
    }

    #[test]
    fn test_thread_worker_cancels_solver_on_timeout() {
        use crate::config::SolverSettings;
        use crate::cp::SolverBackend;

        let all_week = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        let agents = (0..12)
            .map(|i| {
                Agent::new(format!("A{i}"), "ES")
                    .with_contract(Contract::weekly(40.0))
                    .with_windows(WeeklyAvailability::new().with_days(&all_week, DayWindow::continuous(360, 1320)))
            })
            .collect();
        let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let job = ScheduleJob::new(agents, DemandForecast::new(), start, 14).with_solver(
            SolverSettings::default()
                .with_backend(SolverBackend::InMemory)
                .with_time_budget_secs(600),
        );

        let cancel = CancelToken::new();
        let err = ThreadWorker::new(Duration::from_millis(1))
            .run_with_token(job, cancel.clone())
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_process_worker_missing_program() {
        let worker = ProcessWorker::new("/nonexistent/roster-worker", Duration::from_secs(1));
        let err = worker.run(job()).unwrap_err();
        assert!(matches!(err, RosterError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_worker_surfaces_failure() {
        let worker = ProcessWorker::new("sh", Duration::from_secs(5)).with_args(["-c", "echo solver exploded >&2; exit 3"]);
        match worker.run(job()).unwrap_err() {
            RosterError::WorkerFailed { status, diagnostic } => {
                assert!(status.contains('3'));
                assert!(diagnostic.contains("solver exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_process_worker_rejects_corrupt_output() {
        // after `sh -c script sh`, $1 is the input path and $2 the output path
        let worker = ProcessWorker::new("sh", Duration::from_secs(5)).with_args(["-c", "echo garbage > \"$2\"", "sh"]);
        match worker.run(job()).unwrap_err() {
            RosterError::WorkerFailed { diagnostic, .. } => assert!(diagnostic.contains("unreadable result")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_process_worker_kills_on_timeout() {
        let worker = ProcessWorker::new("sh", Duration::from_millis(200)).with_args(["-c", "sleep 5"]);
        let started = Instant::now();
        let err = worker.run(job()).unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
