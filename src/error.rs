//! Error types for rostering operations.
//!
//! Only conditions that make a result meaningless are errors. Recoverable
//! situations (an agent without a contract, an infeasible or timed-out
//! solver run, a shift too short for a break) are logged and absorbed by
//! the component that meets them.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias for rostering operations.
pub type Result<T> = std::result::Result<T, RosterError>;

/// Errors produced by the rostering core.
#[derive(Error, Debug)]
pub enum RosterError {
    /// A numeric argument is outside its valid domain.
    #[error("invalid argument {name} = {value}: {reason}")]
    InvalidArgument {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// The roster or demand input failed structural validation.
    #[error("invalid input: {} issue(s), first: {}", .0.len(), first_message(.0))]
    InvalidInput(Vec<ValidationError>),

    /// An availability window or shift string could not be parsed.
    #[error("cannot parse time window '{input}'")]
    WindowParse { input: String },

    /// The isolated worker exceeded its wall-clock budget.
    #[error("scheduling worker timed out after {seconds}s")]
    WorkerTimedOut { seconds: u64 },

    /// The isolated worker exited abnormally or produced unusable output.
    #[error("scheduling worker failed ({status}): {diagnostic}")]
    WorkerFailed { status: String, diagnostic: String },

    /// The in-process worker thread panicked.
    #[error("scheduling worker panicked: {message}")]
    WorkerPanicked { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn first_message(errors: &[ValidationError]) -> &str {
    errors.first().map(|e| e.message.as_str()).unwrap_or("-")
}

impl RosterError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidArgument {
            name,
            value,
            reason,
        }
    }

    /// Whether the failure is a time-out the caller may answer with the
    /// greedy engine.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::WorkerTimedOut { .. })
    }
}
