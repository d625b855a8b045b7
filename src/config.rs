//! Planner configuration.
//!
//! Every section defaults independently, so a JSON file only needs the
//! keys it changes:
//!
//! ```json
//! { "rules": { "max_sundays": 3 }, "solver": { "time_budget_secs": 10 } }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activities::ActivityConfig;
use crate::cp::{ObjectiveWeights, SolverBackend, SolverConfig};
use crate::error::Result;
use crate::metrics::MetricsConfig;
use crate::rules::RulesConfig;
use crate::staffing::ServiceTarget;

/// Top-level configuration of a planning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Legal and contractual rules.
    pub rules: RulesConfig,
    /// Engine selection and solver budget.
    pub solver: SolverSettings,
    /// Service target used to fill missing requirements and score metrics.
    pub target: ServiceTarget,
    /// Break and PVD placement.
    pub activities: ActivityConfig,
    /// Coverage metrics resolution.
    pub metrics: MetricsConfig,
    /// Isolation of the scheduling run.
    pub worker: WorkerSettings,
}

impl PlannerConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Sets the rules section.
    pub fn with_rules(mut self, rules: RulesConfig) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the solver section.
    pub fn with_solver(mut self, solver: SolverSettings) -> Self {
        self.solver = solver;
        self
    }

    /// Sets the service target.
    pub fn with_target(mut self, target: ServiceTarget) -> Self {
        self.target = target;
        self
    }

    /// Sets the activities section.
    pub fn with_activities(mut self, activities: ActivityConfig) -> Self {
        self.activities = activities;
        self
    }

    /// Sets the metrics section.
    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the worker section.
    pub fn with_worker(mut self, worker: WorkerSettings) -> Self {
        self.worker = worker;
        self
    }
}

/// Engine selection and solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Constraint model the roster is solved with.
    pub backend: SolverBackend,
    /// Wall-clock budget of the constraint solver (seconds).
    pub time_budget_secs: u64,
    /// Parallel search workers.
    pub workers: usize,
    /// Seed for the diversified search workers.
    pub seed: u64,
    /// Rosters with more agents than this go straight to the greedy engine.
    pub max_agents: usize,
    /// Objective coefficients.
    pub weights: ObjectiveWeights,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            backend: SolverBackend::default(),
            time_budget_secs: 30,
            workers: 4,
            seed: SolverConfig::default().seed,
            max_agents: 20,
            weights: ObjectiveWeights::default(),
        }
    }
}

impl SolverSettings {
    /// Sets the solver backend.
    pub fn with_backend(mut self, backend: SolverBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the time budget.
    pub fn with_time_budget_secs(mut self, secs: u64) -> Self {
        self.time_budget_secs = secs;
        self
    }

    /// Sets the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the roster size above which the solver is skipped.
    pub fn with_max_agents(mut self, max: usize) -> Self {
        self.max_agents = max;
        self
    }

    /// Solver parameters for the search backend.
    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig::default()
            .with_time_budget(Duration::from_secs(self.time_budget_secs))
            .with_workers(self.workers)
            .with_seed(self.seed)
    }
}

/// How the scheduling run is isolated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerMode {
    /// A thread of the calling process.
    Thread,
    /// A `roster-worker` child process.
    Process {
        /// Path of the worker executable.
        program: PathBuf,
        /// Arguments placed before the input and output paths.
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Worker isolation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Hard wall-clock limit (seconds).
    pub timeout_secs: u64,
    /// Isolation mechanism.
    pub mode: WorkerMode,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            mode: WorkerMode::Thread,
        }
    }
}

impl WorkerSettings {
    /// Sets the timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the isolation mechanism.
    pub fn with_mode(mut self, mode: WorkerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = PlannerConfig::default();
        assert_eq!(c.rules.max_sundays, 2);
        assert_eq!(c.solver.time_budget_secs, 30);
        assert_eq!(c.solver.workers, 4);
        assert_eq!(c.solver.max_agents, 20);
        assert_eq!(c.worker.mode, WorkerMode::Thread);
        assert_eq!(c.metrics.interval_minutes, 5);
        assert_eq!(c.solver.backend, SolverBackend::Pumpkin);
    }

    #[test]
    fn test_backend_from_json() {
        let c = PlannerConfig::from_json_str(r#"{ "solver": { "backend": "in_memory" } }"#).unwrap();
        assert_eq!(c.solver.backend, SolverBackend::InMemory);
        assert!(PlannerConfig::from_json_str(r#"{ "solver": { "backend": "cplex" } }"#).is_err());
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "rules": { "max_sundays": 3, "relax_weekend": true },
            "solver": { "time_budget_secs": 5 },
            "worker": { "timeout_secs": 10, "mode": { "kind": "process", "program": "/usr/bin/roster-worker" } }
        }"#;
        let c = PlannerConfig::from_json_str(json).unwrap();
        assert_eq!(c.rules.max_sundays, 3);
        assert!(c.rules.relax_weekend);
        assert_eq!(c.rules.default_country, "ES");
        assert_eq!(c.solver.time_budget_secs, 5);
        assert_eq!(c.solver.workers, 4);
        assert_eq!(
            c.worker.mode,
            WorkerMode::Process {
                program: PathBuf::from("/usr/bin/roster-worker"),
                args: Vec::new(),
            }
        );
        assert_eq!(c.solver.solver_config().time_budget, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_json() {
        assert!(PlannerConfig::from_json_str("{ \"solver\": 3 }").is_err());
    }
}
