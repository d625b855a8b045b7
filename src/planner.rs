//! End-to-end planning pipeline.
//!
//! validate → fill missing requirements → assign shifts in a bounded
//! worker (greedy in-process on time-out) → place breaks and PVDs →
//! compute coverage metrics.

use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::activities::ActivityAllocator;
use crate::config::{PlannerConfig, WorkerMode};
use crate::error::{Result, RosterError};
use crate::metrics::{MetricsCalculator, ScheduleMetrics};
use crate::models::{Agent, DemandForecast, Schedule};
use crate::scheduler::{BoundedWorker, Engine, ProcessWorker, ScheduleJob, ThreadWorker};
use crate::staffing::StaffingCalculator;
use crate::validation::check_input;

/// Input of a planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    /// Agents to schedule.
    pub agents: Vec<Agent>,
    /// Half-hour demand per date.
    pub demand: DemandForecast,
    /// First date of the horizon.
    pub start_date: NaiveDate,
    /// Horizon length in days.
    pub days: u32,
}

impl PlanRequest {
    /// Creates a request.
    pub fn new(agents: Vec<Agent>, demand: DemandForecast, start_date: NaiveDate, days: u32) -> Self {
        Self {
            agents,
            demand,
            start_date,
            days,
        }
    }
}

/// Result of a planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutput {
    /// Schedule with activities placed.
    pub schedule: Schedule,
    /// Coverage metrics of the schedule.
    pub metrics: ScheduleMetrics,
    /// Engine that assigned the shifts.
    pub engine: Engine,
    /// Whether the greedy engine stood in for the solver.
    pub fallback: bool,
}

/// Runs the whole pipeline under one configuration.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    /// Creates a planner.
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans a horizon.
    ///
    /// # Errors
    /// Error-level validation findings, invalid staffing inputs, and worker
    /// failures other than a time-out.
    pub fn plan(&self, request: PlanRequest) -> Result<PlanOutput> {
        let started = Instant::now();
        check_input(&request.agents, &request.demand).map_err(RosterError::InvalidInput)?;

        let mut demand = request.demand;
        let filled = StaffingCalculator::new(self.config.target).fill_missing(&mut demand)?;
        debug!(buckets = filled, "required agents recomputed");

        let job = ScheduleJob::new(request.agents, demand, request.start_date, request.days)
            .with_rules(self.config.rules.clone())
            .with_solver(self.config.solver.clone());
        info!(
            agents = job.agents.len(),
            days = job.days,
            start = %job.start_date,
            "planning run started"
        );

        let outcome = match self.worker().run(job.clone()) {
            Ok(outcome) => outcome,
            Err(e) if e.is_timeout() => {
                warn!(error = %e, "scheduling worker timed out, running greedy in-process");
                let mut outcome = job.run_greedy();
                outcome.fallback = true;
                outcome
            }
            Err(e) => return Err(e),
        };

        let mut schedule = outcome.schedule;
        let placed = ActivityAllocator::new(self.config.activities.clone()).allocate(&mut schedule);
        let metrics = MetricsCalculator::new(self.config.target, self.config.metrics).calculate(&schedule, &job.demand)?;

        info!(
            engine = ?outcome.engine,
            fallback = outcome.fallback,
            shifts_with_activities = placed,
            hours = metrics.total_hours,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "planning run finished"
        );
        Ok(PlanOutput {
            schedule,
            metrics,
            engine: outcome.engine,
            fallback: outcome.fallback,
        })
    }

    fn worker(&self) -> Box<dyn BoundedWorker> {
        let timeout = self.config.worker.timeout();
        match &self.config.worker.mode {
            WorkerMode::Thread => Box::new(ThreadWorker::new(timeout)),
            WorkerMode::Process { program, args } => Box::new(ProcessWorker::new(program.clone(), timeout).with_args(args.iter().cloned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SolverSettings, WorkerSettings};
    use crate::models::{horizon_dates, ActivityKind, Contract, DayDemand, DayWindow, RequirementSlot, WeeklyAvailability};
    use crate::validation::audit_schedule;
    use chrono::Weekday;

    const WEEKDAYS: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn office_agent(id: &str) -> Agent {
        Agent::new(id, "ES")
            .with_contract(Contract::weekly(40.0))
            .with_windows(WeeklyAvailability::new().with_days(&WEEKDAYS, DayWindow::continuous(480, 960)))
    }

    /// Weekday demand between 08:00 and 16:00; requirements left to compute.
    fn office_demand() -> DemandForecast {
        let mut forecast = DemandForecast::new();
        for date in horizon_dates(monday(), 7).filter(|d| !crate::rules::is_weekend(*d)) {
            let slots = (0..48)
                .map(|i| {
                    if (16..32).contains(&i) {
                        RequirementSlot::new(20.0, 180.0, 0.0)
                    } else {
                        RequirementSlot::default()
                    }
                })
                .collect();
            forecast = forecast.with_day(date, DayDemand::new(slots));
        }
        forecast
    }

    fn config() -> PlannerConfig {
        PlannerConfig::default().with_solver(SolverSettings::default().with_workers(1).with_time_budget_secs(5))
    }

    #[test]
    fn test_forty_hour_week_end_to_end() {
        let request = PlanRequest::new(vec![office_agent("A1")], office_demand(), monday(), 7);
        let out = Planner::new(config()).plan(request.clone()).unwrap();

        assert_eq!(out.engine, Engine::ConstraintSolver);
        assert!(!out.fallback);
        let row = out.schedule.agent("A1").unwrap();
        for (i, date) in horizon_dates(monday(), 7).enumerate() {
            let entry = &row.entries[&date];
            if i < 5 {
                let shift = entry.as_work().unwrap();
                assert_eq!(shift.label, "08:00-16:00");
                assert_eq!(shift.activities_of(ActivityKind::Break).count(), 1);
                assert_eq!(shift.activities_of(ActivityKind::Break).next().unwrap().duration(), 20);
                assert_eq!(shift.activities_of(ActivityKind::Pvd).count(), 8);
            } else {
                assert_eq!(entry.label(), "OFF");
            }
        }

        assert_eq!(out.metrics.total_hours, 40.0);
        assert_eq!(out.metrics.active_agents, 1);
        assert_eq!(out.metrics.daily_metrics.len(), 7);
        // 20 calls per half hour at 180s need 4 agents; one is never enough
        let monday_slots = &out.metrics.daily_metrics[&monday()].slots;
        assert_eq!(monday_slots[100].required, 4.0);
        assert!(monday_slots[100].at_risk);

        assert!(audit_schedule(&out.schedule, &request.agents, &config().rules).is_empty());
    }

    #[test]
    fn test_flat_demand_week_keeps_weekend_off() {
        // one required agent in every bucket, all seven days
        let demand = horizon_dates(monday(), 7).fold(DemandForecast::new(), |f, d| {
            f.with_day(d, DayDemand::flat(10.0, 180.0, 1.0))
        });
        let request = PlanRequest::new(vec![office_agent("A1")], demand, monday(), 7);
        let out = Planner::new(config()).plan(request).unwrap();

        assert_eq!(out.engine, Engine::ConstraintSolver);
        let row = out.schedule.agent("A1").unwrap();
        let labels: Vec<&str> = horizon_dates(monday(), 7).map(|d| row.entries[&d].label()).collect();
        assert_eq!(
            labels,
            vec!["08:00-16:00", "08:00-16:00", "08:00-16:00", "08:00-16:00", "08:00-16:00", "OFF", "OFF"]
        );
        for (_, shift) in row.work_days() {
            let breaks: Vec<_> = shift.activities_of(ActivityKind::Break).collect();
            assert_eq!(breaks.len(), 1);
            assert_eq!(breaks[0].duration(), 20);
            assert_eq!(shift.activities_of(ActivityKind::Pvd).count(), 8);
        }
        assert_eq!(out.metrics.total_hours, 40.0);
    }

    #[test]
    fn test_worker_timeout_falls_back_to_greedy() {
        let cfg = config().with_worker(WorkerSettings::default().with_timeout_secs(0));
        let request = PlanRequest::new(vec![office_agent("A1")], office_demand(), monday(), 7);
        let out = Planner::new(cfg).plan(request).unwrap();

        assert_eq!(out.engine, Engine::Greedy);
        assert!(out.fallback);
        assert_eq!(out.schedule.agent("A1").unwrap().worked_minutes(), 2400);
    }

    #[test]
    fn test_invalid_input_is_refused() {
        let request = PlanRequest::new(vec![office_agent("A1"), office_agent("A1")], office_demand(), monday(), 7);
        match Planner::default().plan(request) {
            Err(RosterError::InvalidInput(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_agent_without_contract_is_kept() {
        let request = PlanRequest::new(vec![office_agent("A1"), Agent::new("B", "ES")], office_demand(), monday(), 7);
        let out = Planner::new(config()).plan(request).unwrap();
        assert_eq!(out.schedule.agent_count(), 2);
        assert!(!out.schedule.agent("B").unwrap().is_active());
        assert_eq!(out.metrics.active_agents, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_worker_failure_propagates() {
        let cfg = config().with_worker(WorkerSettings::default().with_mode(WorkerMode::Process {
            program: "sh".into(),
            args: vec!["-c".to_string(), "echo no solver here >&2; exit 2".to_string()],
        }));
        let request = PlanRequest::new(vec![office_agent("A1")], office_demand(), monday(), 7);
        let err = Planner::new(cfg).plan(request).unwrap_err();
        assert!(matches!(err, RosterError::WorkerFailed { .. }));
    }
}
