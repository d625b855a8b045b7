//! Roster formulation over [`ConstraintModel`].
//!
//! One boolean per (agent, date, candidate shift), a `works` boolean per
//! (agent, date) channelled to the sum of that day's shift variables, and an
//! `is_active` boolean per agent gating the hours band.
//!
//! # Objective
//! For a shift variable: the coverage score of every half-hour bucket it
//! touches (`coverage_base + coverage_volume × calls / peak_calls` where
//! agents are required, `-met_slot_penalty` otherwise), plus its duration
//! (closing the shortfall to target one point per minute), plus the agent's
//! preference weight, less `weekend_penalty` on Saturdays and Sundays. For
//! `is_active`: `active_bonus - target_minutes`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{BoolVar, ConstraintModel, CpSolution, LinearConstraint, LinearExpr, SolveStatus, SolverConfig};
use crate::catalog::AgentCatalog;
use crate::models::{horizon_dates, AgentSchedule, DemandForecast, Schedule, ScheduleEntry, ShiftCandidate};
use crate::rules::{earliest_start, is_weekend, WeekKey};

/// Objective coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    /// Score of covering a bucket that needs agents.
    pub coverage_base: i64,
    /// Extra score for the busiest bucket of the horizon, scaled by volume.
    pub coverage_volume: i64,
    /// Cost of placing an agent in a bucket with no requirement.
    pub met_slot_penalty: i64,
    /// Bonus for scheduling an agent at all.
    pub active_bonus: i64,
    /// Cost per minute below target.
    pub shortfall_per_minute: i64,
    /// Cost of a weekend shift; breaks ties toward weekdays.
    pub weekend_penalty: i64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            coverage_base: 1000,
            coverage_volume: 2000,
            met_slot_penalty: 5,
            active_bonus: 500,
            shortfall_per_minute: 1,
            weekend_penalty: 1,
        }
    }
}

/// Variables of one agent.
#[derive(Debug, Clone)]
struct AgentVars {
    is_active: Option<BoolVar>,
    days: Vec<DayVars>,
}

/// Variables of one (agent, date). Empty for closed and absent days.
#[derive(Debug, Clone, Default)]
struct DayVars {
    works: Option<BoolVar>,
    shifts: Vec<BoolVar>,
}

/// Variable handles produced by [`RosterCpBuilder::build`].
#[derive(Debug, Clone)]
pub struct RosterVars {
    agents: Vec<AgentVars>,
}

/// A decoded roster.
#[derive(Debug, Clone)]
pub struct RosterSolution {
    /// Decoded schedule.
    pub schedule: Schedule,
    /// Solver outcome.
    pub status: SolveStatus,
    /// Objective value.
    pub objective: i64,
    /// Search nodes explored.
    pub nodes: u64,
    /// Solve time.
    pub elapsed: Duration,
}

/// Builds the roster model from agent catalogs and demand.
///
/// # Example
/// ```
/// use chrono::{NaiveDate, Weekday};
/// use u_roster::catalog::ShiftCatalogBuilder;
/// use u_roster::cp::{InMemoryModel, RosterCpBuilder};
/// use u_roster::cp::SolverConfig;
/// use u_roster::models::{Agent, Contract, DayWindow, DemandForecast, WeeklyAvailability};
/// use u_roster::rules::RulesConfig;
///
/// let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
/// let agent = Agent::new("A1", "ES")
///     .with_contract(Contract::weekly(8.0))
///     .with_windows(WeeklyAvailability::new().with_day(Weekday::Mon, DayWindow::continuous(480, 960)));
/// let terms = RulesConfig::default().terms_for(&agent, start, 1).unwrap();
/// let catalogs = vec![ShiftCatalogBuilder::new().build_horizon(&agent, terms, start, 1)];
/// let demand = DemandForecast::new();
///
/// let builder = RosterCpBuilder::new(&catalogs, &demand, start, 1);
/// let solution = builder.solve(InMemoryModel::new(), &SolverConfig::default().with_workers(1));
/// assert!(solution.is_ok());
/// ```
pub struct RosterCpBuilder<'a> {
    catalogs: &'a [AgentCatalog],
    demand: &'a DemandForecast,
    start: NaiveDate,
    days: u32,
    weights: ObjectiveWeights,
}

impl<'a> RosterCpBuilder<'a> {
    /// Creates a builder over `days` dates from `start`.
    pub fn new(catalogs: &'a [AgentCatalog], demand: &'a DemandForecast, start: NaiveDate, days: u32) -> Self {
        Self {
            catalogs,
            demand,
            start,
            days,
            weights: ObjectiveWeights::default(),
        }
    }

    /// Overrides the objective coefficients.
    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Adds variables, constraints, hints and the objective to `model`.
    ///
    /// Creates, per agent:
    /// - `is_active` (hinted true), then per date the shift variables and `works`
    /// - `Σ shifts == works` per date
    /// - worked days per ISO week ≤ cap, and ≤ long-shift cap when a long shift is chosen
    /// - Saturday + Sunday of a week ≤ 1 (unless relaxed)
    /// - worked Sundays ≤ Sunday cap
    /// - no shift starting before the rest limit after a late shift the day before
    /// - worked minutes within `[min, max]` when active, zero otherwise
    pub fn build<M: ConstraintModel>(&self, model: &mut M) -> RosterVars {
        let dates: Vec<NaiveDate> = horizon_dates(self.start, self.days).collect();
        let peak = self.demand.peak_calls(dates.iter());
        let mut objective = LinearExpr::new();
        let mut agents = Vec::with_capacity(self.catalogs.len());

        for catalog in self.catalogs {
            let vars = self.build_agent(model, catalog, peak, &mut objective);
            agents.push(vars);
        }

        model.maximize(objective);
        debug!(
            agents = agents.len(),
            vars = model.var_count(),
            constraints = model.constraint_count(),
            "roster model built"
        );
        RosterVars { agents }
    }

    fn build_agent<M: ConstraintModel>(
        &self,
        model: &mut M,
        catalog: &AgentCatalog,
        peak: f64,
        objective: &mut LinearExpr,
    ) -> AgentVars {
        let id = &catalog.agent_id;
        let terms = &catalog.terms;

        if catalog.days.iter().all(|d| !d.is_open()) {
            return AgentVars {
                is_active: None,
                days: vec![DayVars::default(); catalog.days.len()],
            };
        }

        let is_active = model.new_bool_var(&format!("{id}_active"));
        model.add_hint(is_active, true);
        objective.add_term(
            is_active,
            self.weights.active_bonus - self.weights.shortfall_per_minute * terms.target_minutes,
        );

        let mut days = Vec::with_capacity(catalog.days.len());
        for options in &catalog.days {
            if !options.is_open() {
                days.push(DayVars::default());
                continue;
            }
            let mut shifts = Vec::with_capacity(options.candidates.len());
            for (k, candidate) in options.candidates.iter().enumerate() {
                let var = model.new_bool_var(&format!("{id}_{}_{k}", options.date));
                let preference = options.preferences.get(k).copied().unwrap_or(0);
                objective.add_term(var, self.shift_score(options.date, candidate, peak) + preference);
                shifts.push(var);
            }
            let works = model.new_bool_var(&format!("{id}_{}_works", options.date));
            model.add_sum_equals(&shifts, works);
            days.push(DayVars {
                works: Some(works),
                shifts,
            });
        }

        self.add_week_caps(model, catalog, &days);
        self.add_weekend_rules(model, catalog, &days);
        self.add_rest_rule(model, catalog, &days);

        // hours band
        let mut total = LinearExpr::new();
        for (options, vars) in catalog.days.iter().zip(&days) {
            for (candidate, var) in options.candidates.iter().zip(&vars.shifts) {
                total.add_term(*var, i64::from(candidate.duration_minutes));
            }
        }
        model.add_constraint(LinearConstraint::le(total.clone(), terms.max_minutes).only_if(is_active));
        model.add_constraint(LinearConstraint::ge(total.clone(), terms.min_minutes).only_if(is_active));
        model.add_constraint(LinearConstraint::le(total, 0).only_if(is_active.not()));

        AgentVars {
            is_active: Some(is_active),
            days,
        }
    }

    fn add_week_caps<M: ConstraintModel>(&self, model: &mut M, catalog: &AgentCatalog, days: &[DayVars]) {
        let terms = &catalog.terms;
        let mut weeks: BTreeMap<WeekKey, Vec<usize>> = BTreeMap::new();
        for (i, options) in catalog.days.iter().enumerate() {
            weeks.entry(WeekKey::of(options.date)).or_default().push(i);
        }

        for indices in weeks.values() {
            let works: Vec<BoolVar> = indices.iter().filter_map(|&i| days[i].works).collect();
            if works.is_empty() {
                continue;
            }
            let cap = i64::from(terms.week_cap(false));
            if works.len() as i64 > cap {
                model.add_at_most(&works, cap);
            }

            let long_cap = i64::from(terms.week_cap(true));
            if long_cap >= cap {
                continue;
            }
            for &i in indices {
                for (candidate, var) in catalog.days[i].candidates.iter().zip(&days[i].shifts) {
                    if terms.policy.is_long_shift(candidate.duration_minutes) {
                        let week = LinearExpr::sum(works.iter().copied());
                        model.add_constraint(LinearConstraint::le(week, long_cap).only_if(*var));
                    }
                }
            }
        }
    }

    fn add_weekend_rules<M: ConstraintModel>(&self, model: &mut M, catalog: &AgentCatalog, days: &[DayVars]) {
        let terms = &catalog.terms;

        if !terms.relax_weekend {
            for (i, options) in catalog.days.iter().enumerate() {
                if options.date.weekday() != Weekday::Sat || i + 1 >= days.len() {
                    continue;
                }
                if let (Some(sat), Some(sun)) = (days[i].works, days[i + 1].works) {
                    model.add_at_most(&[sat, sun], 1);
                }
            }
        }

        let sundays: Vec<BoolVar> = catalog
            .days
            .iter()
            .zip(days)
            .filter(|(o, _)| o.date.weekday() == Weekday::Sun)
            .filter_map(|(_, v)| v.works)
            .collect();
        if sundays.len() as i64 > i64::from(terms.sunday_cap) {
            model.add_at_most(&sundays, i64::from(terms.sunday_cap));
        }
    }

    fn add_rest_rule<M: ConstraintModel>(&self, model: &mut M, catalog: &AgentCatalog, days: &[DayVars]) {
        for i in 0..days.len().saturating_sub(1) {
            let (today, tomorrow) = (&catalog.days[i], &catalog.days[i + 1]);
            for (candidate, var) in today.candidates.iter().zip(&days[i].shifts) {
                let limit = earliest_start(Some(candidate.end_min));
                if limit <= 0 {
                    continue;
                }
                let conflicts: Vec<BoolVar> = tomorrow
                    .candidates
                    .iter()
                    .zip(&days[i + 1].shifts)
                    .filter(|(next, _)| next.start_min < limit)
                    .map(|(_, v)| *v)
                    .collect();
                if conflicts.is_empty() {
                    continue;
                }
                let mut vars = conflicts;
                vars.push(*var);
                model.add_at_most(&vars, 1);
            }
        }
    }

    fn shift_score(&self, date: NaiveDate, candidate: &ShiftCandidate, peak: f64) -> i64 {
        let coverage: i64 = candidate
            .half_hour_slots()
            .map(|idx| {
                let slot = self.demand.slot(date, idx);
                if slot.required_agents() > 0 {
                    self.weights.coverage_base
                        + (slot.calls / peak * self.weights.coverage_volume as f64) as i64
                } else {
                    -self.weights.met_slot_penalty
                }
            })
            .sum();
        let weekend = if is_weekend(date) { self.weights.weekend_penalty } else { 0 };
        coverage + self.weights.shortfall_per_minute * i64::from(candidate.duration_minutes) - weekend
    }

    /// Builds the model, solves it and decodes the assignment.
    ///
    /// Returns the solver status as the error when no solution was found
    /// ([`SolveStatus::Infeasible`] or [`SolveStatus::Unknown`]).
    pub fn solve<M: ConstraintModel>(
        &self,
        mut model: M,
        config: &SolverConfig,
    ) -> Result<RosterSolution, SolveStatus> {
        let vars = self.build(&mut model);
        let solution = model.solve(config);
        info!(
            status = ?solution.status,
            objective = solution.objective,
            nodes = solution.nodes,
            elapsed_ms = solution.elapsed.as_millis() as u64,
            "roster solve finished"
        );
        if !solution.is_solution_found() {
            return Err(solution.status);
        }
        Ok(RosterSolution {
            schedule: self.decode(&vars, &solution),
            status: solution.status,
            objective: solution.objective,
            nodes: solution.nodes,
            elapsed: solution.elapsed,
        })
    }

    /// Turns an assignment into a schedule.
    pub fn decode(&self, vars: &RosterVars, solution: &CpSolution) -> Schedule {
        let mut schedule = Schedule::new(self.start, self.days);
        for (catalog, agent_vars) in self.catalogs.iter().zip(&vars.agents) {
            let mut row = AgentSchedule::new(catalog.agent_id.clone());
            for (options, day) in catalog.days.iter().zip(&agent_vars.days) {
                let entry = if let Some(absence) = &options.absence {
                    ScheduleEntry::absence(absence.kind, absence.description.clone())
                } else {
                    day.shifts
                        .iter()
                        .position(|v| solution.value(*v))
                        .and_then(|k| options.candidates.get(k))
                        .map(ScheduleEntry::from)
                        .unwrap_or(ScheduleEntry::Off)
                };
                row.set(options.date, entry);
            }
            if agent_vars.is_active.is_some_and(|v| !solution.value(v)) {
                debug!(agent = %catalog.agent_id, "agent left inactive by the solver");
            }
            schedule.add_agent(row);
        }
        schedule
    }
}
