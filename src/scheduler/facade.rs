//! Engine selection.
//!
//! Small rosters go to the constraint solver; rosters above
//! `max_agents`, and any run where the solver finds nothing within its
//! budget, go to the greedy engine. A schedule covering every agent and
//! date is always returned. The solver backend comes from
//! [`SolverSettings::backend`].

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::GreedyScheduler;
use crate::catalog::{AgentCatalog, ShiftCatalogBuilder};
use crate::config::SolverSettings;
use crate::cp::{CancelToken, InMemoryModel, PumpkinModel, RosterCpBuilder, SolveStatus, SolverBackend};
use crate::models::{horizon_dates, Agent, AgentSchedule, DemandForecast, Schedule, ScheduleEntry};
use crate::rules::RulesConfig;

/// Engine that produced a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Exact constraint model.
    ConstraintSolver,
    /// Coverage-driven heuristic.
    Greedy,
}

/// A self-contained scheduling run, serializable for worker handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleJob {
    /// Agents to schedule.
    pub agents: Vec<Agent>,
    /// Demand with required agents filled in.
    pub demand: DemandForecast,
    /// First date of the horizon.
    pub start_date: NaiveDate,
    /// Horizon length in days.
    pub days: u32,
    /// Rule configuration.
    #[serde(default)]
    pub rules: RulesConfig,
    /// Engine settings.
    #[serde(default)]
    pub solver: SolverSettings,
}

impl ScheduleJob {
    /// Creates a job with default rules and solver settings.
    pub fn new(agents: Vec<Agent>, demand: DemandForecast, start_date: NaiveDate, days: u32) -> Self {
        Self {
            agents,
            demand,
            start_date,
            days,
            rules: RulesConfig::default(),
            solver: SolverSettings::default(),
        }
    }

    /// Sets the rules.
    pub fn with_rules(mut self, rules: RulesConfig) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the solver settings.
    pub fn with_solver(mut self, solver: SolverSettings) -> Self {
        self.solver = solver;
        self
    }

    /// Runs the job through the facade.
    pub fn run(&self) -> RosterOutcome {
        SchedulerFacade::new(self.rules.clone(), self.solver.clone()).run(self)
    }

    /// Runs the job; the solver stops early once `cancel` is set.
    pub fn run_cancellable(&self, cancel: CancelToken) -> RosterOutcome {
        SchedulerFacade::new(self.rules.clone(), self.solver.clone())
            .with_cancel(cancel)
            .run(self)
    }

    /// Runs the job through the greedy engine only.
    pub fn run_greedy(&self) -> RosterOutcome {
        SchedulerFacade::new(self.rules.clone(), self.solver.clone()).run_greedy(self, false)
    }
}

/// Result of a scheduling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterOutcome {
    /// The schedule, one row per input agent.
    pub schedule: Schedule,
    /// Engine that produced it.
    pub engine: Engine,
    /// Whether the greedy engine stood in for the solver.
    pub fallback: bool,
    /// Solver status, when the solver ran.
    pub status: Option<SolveStatus>,
    /// Solver objective, when the solver produced the schedule.
    pub objective: Option<i64>,
}

/// Chooses and runs an engine.
#[derive(Debug, Clone, Default)]
pub struct SchedulerFacade {
    rules: RulesConfig,
    settings: SolverSettings,
    catalog: ShiftCatalogBuilder,
    cancel: Option<CancelToken>,
}

impl SchedulerFacade {
    /// Creates a facade.
    pub fn new(rules: RulesConfig, settings: SolverSettings) -> Self {
        Self {
            rules,
            settings,
            catalog: ShiftCatalogBuilder::new(),
            cancel: None,
        }
    }

    /// Shares a cancel token with the solver.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs the solver or the greedy engine, whichever applies.
    pub fn run(&self, job: &ScheduleJob) -> RosterOutcome {
        let catalogs = self.catalogs(job);
        if catalogs.len() > self.settings.max_agents {
            info!(
                agents = catalogs.len(),
                max_agents = self.settings.max_agents,
                "roster too large for the solver, using greedy"
            );
            return self.greedy(job, &catalogs, false, None);
        }

        info!(
            agents = catalogs.len(),
            days = job.days,
            backend = ?self.settings.backend,
            "running constraint solver"
        );
        let builder = RosterCpBuilder::new(&catalogs, &job.demand, job.start_date, job.days)
            .with_weights(self.settings.weights.clone());
        let mut config = self.settings.solver_config();
        if let Some(cancel) = &self.cancel {
            config = config.with_cancel(cancel.clone());
        }
        let result = match self.settings.backend {
            SolverBackend::Pumpkin => builder.solve(PumpkinModel::new(), &config),
            SolverBackend::InMemory => builder.solve(InMemoryModel::new(), &config),
        };
        match result {
            Ok(solution) => RosterOutcome {
                schedule: self.complete(job, solution.schedule),
                engine: Engine::ConstraintSolver,
                fallback: false,
                status: Some(solution.status),
                objective: Some(solution.objective),
            },
            Err(status) => {
                warn!(?status, "constraint solver found no solution, falling back to greedy");
                self.greedy(job, &catalogs, true, Some(status))
            }
        }
    }

    /// Runs the greedy engine. `fallback` marks it as standing in for the solver.
    pub fn run_greedy(&self, job: &ScheduleJob, fallback: bool) -> RosterOutcome {
        let catalogs = self.catalogs(job);
        self.greedy(job, &catalogs, fallback, None)
    }

    fn greedy(&self, job: &ScheduleJob, catalogs: &[AgentCatalog], fallback: bool, status: Option<SolveStatus>) -> RosterOutcome {
        let schedule = GreedyScheduler::new().schedule(catalogs, &job.demand, job.start_date, job.days);
        RosterOutcome {
            schedule: self.complete(job, schedule),
            engine: Engine::Greedy,
            fallback,
            status,
            objective: None,
        }
    }

    fn catalogs(&self, job: &ScheduleJob) -> Vec<AgentCatalog> {
        job.agents
            .iter()
            .filter_map(|agent| match self.rules.terms_for(agent, job.start_date, job.days) {
                Some(terms) => Some(self.catalog.build_horizon(agent, terms, job.start_date, job.days)),
                None => {
                    warn!(agent = %agent.id, "agent has no usable contract, skipping");
                    None
                }
            })
            .collect()
    }

    /// Reorders rows to input order and adds rows for skipped agents.
    fn complete(&self, job: &ScheduleJob, engine_schedule: Schedule) -> Schedule {
        let mut rows: HashMap<String, AgentSchedule> = engine_schedule
            .agents
            .into_iter()
            .map(|row| (row.agent_id.clone(), row))
            .collect();

        let mut schedule = Schedule::new(job.start_date, job.days);
        for agent in &job.agents {
            let row = rows
                .remove(&agent.id)
                .unwrap_or_else(|| unscheduled_row(agent, job.start_date, job.days));
            schedule.add_agent(row);
        }
        schedule
    }
}

/// A row with only absences and days off.
fn unscheduled_row(agent: &Agent, start: NaiveDate, days: u32) -> AgentSchedule {
    let mut row = AgentSchedule::new(agent.id.clone());
    for date in horizon_dates(start, days) {
        let entry = match agent.absence_on(date) {
            Some(a) => ScheduleEntry::absence(a.kind, a.description.clone()),
            None => ScheduleEntry::Off,
        };
        row.set(date, entry);
    }
    row
}
