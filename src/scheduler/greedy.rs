//! Coverage-driven greedy roster builder.
//!
//! # Algorithm
//!
//! 1. Agents are processed in input order, each over the horizon in date order.
//! 2. For each open date, check whether the agent may work at all (weekly
//!    day cap, Sunday cap, weekend rule, target not yet reached).
//! 3. Score every candidate that respects the rest rule and the hours cap:
//!    each half-hour bucket still short of agents scores
//!    `10 + 20 × calls / peak_calls`, each already covered bucket `-0.5`.
//! 4. Take the best candidate (first wins ties) when its score is positive
//!    or the agent is still below the take threshold of its target.
//! 5. Coverage accumulates, so later agents fill what earlier ones left.
//!
//! # Complexity
//! O(a × d × c × 48) for a agents, d dates and c candidates per date.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::debug;

use crate::catalog::{AgentCatalog, DayOptions};
use crate::models::{horizon_dates, AgentSchedule, DemandForecast, Schedule, ScheduleEntry, ShiftCandidate, SLOTS_PER_DAY};
use crate::rules::{earliest_start, AgentTerms, WeekKey};

/// Greedy roster builder.
///
/// # Example
///
/// ```
/// use chrono::{NaiveDate, Weekday};
/// use u_roster::catalog::ShiftCatalogBuilder;
/// use u_roster::models::{Agent, Contract, DayWindow, DemandForecast, WeeklyAvailability};
/// use u_roster::rules::RulesConfig;
/// use u_roster::scheduler::GreedyScheduler;
///
/// let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
/// let agent = Agent::new("A1", "ES")
///     .with_contract(Contract::weekly(56.0).with_days_per_week(7))
///     .with_windows(WeeklyAvailability::new().with_day(Weekday::Mon, DayWindow::continuous(480, 960)));
/// let terms = RulesConfig::default().terms_for(&agent, start, 1).unwrap();
/// let catalogs = vec![ShiftCatalogBuilder::new().build_horizon(&agent, terms, start, 1)];
///
/// let schedule = GreedyScheduler::new().schedule(&catalogs, &DemandForecast::new(), start, 1);
/// assert_eq!(schedule.entry("A1", start).unwrap().label(), "08:00-16:00");
/// ```
#[derive(Debug, Clone)]
pub struct GreedyScheduler {
    uncovered_base: f64,
    uncovered_volume: f64,
    covered_penalty: f64,
}

impl Default for GreedyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Running totals of one agent.
#[derive(Debug, Default)]
struct AgentState {
    week_days: HashMap<WeekKey, u32>,
    long_weeks: HashSet<WeekKey>,
    saturdays: HashSet<WeekKey>,
    sundays: u32,
    total: i64,
    last_end: Option<i32>,
}

impl AgentState {
    fn can_work(&self, terms: &AgentTerms, date: NaiveDate) -> bool {
        let week = WeekKey::of(date);
        let worked = self.week_days.get(&week).copied().unwrap_or(0);
        if worked >= terms.week_cap(self.long_weeks.contains(&week)) {
            return false;
        }
        if self.total >= terms.target_minutes {
            return false;
        }
        if date.weekday() == Weekday::Sun {
            if self.sundays >= terms.sunday_cap {
                return false;
            }
            if !terms.relax_weekend && self.saturdays.contains(&week) {
                return false;
            }
        }
        true
    }

    fn allows(&self, terms: &AgentTerms, date: NaiveDate, candidate: &ShiftCandidate) -> bool {
        if candidate.start_min < earliest_start(self.last_end) {
            return false;
        }
        if self.total + i64::from(candidate.duration_minutes) > terms.max_minutes {
            return false;
        }
        if terms.policy.is_long_shift(candidate.duration_minutes) {
            let worked = self.week_days.get(&WeekKey::of(date)).copied().unwrap_or(0);
            if worked >= terms.week_cap(true) {
                return false;
            }
        }
        true
    }

    fn take(&mut self, terms: &AgentTerms, date: NaiveDate, candidate: &ShiftCandidate) {
        let week = WeekKey::of(date);
        *self.week_days.entry(week).or_insert(0) += 1;
        if terms.policy.is_long_shift(candidate.duration_minutes) {
            self.long_weeks.insert(week);
        }
        match date.weekday() {
            Weekday::Sat => {
                self.saturdays.insert(week);
            }
            Weekday::Sun => self.sundays += 1,
            _ => {}
        }
        self.total += i64::from(candidate.duration_minutes);
        self.last_end = Some(candidate.end_min);
    }
}

impl GreedyScheduler {
    /// Creates a scheduler with the standard scoring.
    pub fn new() -> Self {
        Self {
            uncovered_base: 10.0,
            uncovered_volume: 20.0,
            covered_penalty: 0.5,
        }
    }

    /// Builds a schedule for every catalog over `days` dates from `start`.
    pub fn schedule(&self, catalogs: &[AgentCatalog], demand: &DemandForecast, start: NaiveDate, days: u32) -> Schedule {
        let dates: Vec<NaiveDate> = horizon_dates(start, days).collect();
        let peak = demand.peak_calls(dates.iter());
        let mut coverage: HashMap<NaiveDate, Vec<u32>> =
            dates.iter().map(|d| (*d, vec![0; SLOTS_PER_DAY])).collect();

        let mut schedule = Schedule::new(start, days);
        for catalog in catalogs {
            let row = self.schedule_agent(catalog, demand, peak, &mut coverage);
            debug!(agent = %catalog.agent_id, minutes = row.worked_minutes(), "greedy agent done");
            schedule.add_agent(row);
        }
        schedule
    }

    fn schedule_agent(
        &self,
        catalog: &AgentCatalog,
        demand: &DemandForecast,
        peak: f64,
        coverage: &mut HashMap<NaiveDate, Vec<u32>>,
    ) -> AgentSchedule {
        let terms = &catalog.terms;
        let mut state = AgentState::default();
        let mut row = AgentSchedule::new(catalog.agent_id.clone());

        for options in &catalog.days {
            if let Some(absence) = &options.absence {
                row.set(options.date, ScheduleEntry::absence(absence.kind, absence.description.clone()));
                state.last_end = None;
                continue;
            }

            let choice = if state.can_work(terms, options.date) {
                self.pick(&state, terms, options, demand, peak, coverage)
            } else {
                None
            };

            match choice {
                Some(candidate) => {
                    if let Some(day) = coverage.get_mut(&options.date) {
                        for idx in candidate.half_hour_slots() {
                            day[idx] += 1;
                        }
                    }
                    state.take(terms, options.date, candidate);
                    row.set(options.date, ScheduleEntry::from(candidate));
                }
                None => {
                    state.last_end = None;
                    row.set(options.date, ScheduleEntry::Off);
                }
            }
        }
        row
    }

    fn pick<'c>(
        &self,
        state: &AgentState,
        terms: &AgentTerms,
        options: &'c DayOptions,
        demand: &DemandForecast,
        peak: f64,
        coverage: &HashMap<NaiveDate, Vec<u32>>,
    ) -> Option<&'c ShiftCandidate> {
        let covered = coverage.get(&options.date);
        let mut best: Option<(&ShiftCandidate, f64)> = None;

        for candidate in options.candidates.iter().filter(|c| state.allows(terms, options.date, c)) {
            let score: f64 = candidate
                .half_hour_slots()
                .map(|idx| {
                    let slot = demand.slot(options.date, idx);
                    let have = covered.and_then(|c| c.get(idx)).copied().unwrap_or(0);
                    if slot.required_agents() > have {
                        self.uncovered_base + slot.calls / peak * self.uncovered_volume
                    } else {
                        -self.covered_penalty
                    }
                })
                .sum();
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        let (candidate, score) = best?;
        let below_threshold = (state.total as f64) < terms.target_minutes as f64 * terms.policy.greedy_take_threshold;
        (score > 0.0 || below_threshold).then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ShiftCatalogBuilder;
    use crate::models::{Absence, AbsenceKind, Agent, Contract, DayDemand, DayWindow, RequirementSlot, WeeklyAvailability};
    use crate::rules::RulesConfig;
    use crate::validation::audit_schedule;
    use proptest::prelude::*;

    const WEEKDAYS: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn catalogs(agents: &[Agent], days: u32) -> Vec<AgentCatalog> {
        let rules = RulesConfig::default();
        agents
            .iter()
            .map(|a| {
                let terms = rules.terms_for(a, monday(), days).unwrap();
                ShiftCatalogBuilder::new().build_horizon(a, terms, monday(), days)
            })
            .collect()
    }

    fn office_hours(required: f64) -> DayDemand {
        DayDemand::new(
            (0..48)
                .map(|i| {
                    if (16..32).contains(&i) {
                        RequirementSlot::new(10.0, 180.0, required)
                    } else {
                        RequirementSlot::default()
                    }
                })
                .collect(),
        )
    }

    #[test]
    fn test_forty_hour_week() {
        let agent = Agent::new("A1", "ES")
            .with_contract(Contract::weekly(40.0))
            .with_windows(WeeklyAvailability::new().with_days(&WEEKDAYS, DayWindow::continuous(480, 960)));
        let mut demand = DemandForecast::new();
        for d in horizon_dates(monday(), 5) {
            demand = demand.with_day(d, office_hours(3.0));
        }

        let schedule = GreedyScheduler::new().schedule(&catalogs(&[agent], 7), &demand, monday(), 7);
        let row = schedule.agent("A1").unwrap();
        let labels: Vec<&str> = horizon_dates(monday(), 7).map(|d| row.entries[&d].label()).collect();
        assert_eq!(
            labels,
            vec!["08:00-16:00", "08:00-16:00", "08:00-16:00", "08:00-16:00", "08:00-16:00", "OFF", "OFF"]
        );
    }

    #[test]
    fn test_second_agent_avoids_covered_slots() {
        let window = WeeklyAvailability::new().with_day(Weekday::Mon, DayWindow::continuous(360, 1320));
        let contract = Contract::weekly(56.0).with_days_per_week(7);
        let agents = [
            Agent::new("A1", "ES").with_contract(contract.clone()).with_windows(window.clone()),
            Agent::new("A2", "ES").with_contract(contract).with_windows(window),
        ];
        let demand = DemandForecast::new().with_day(monday(), office_hours(1.0));

        let schedule = GreedyScheduler::new().schedule(&catalogs(&agents, 1), &demand, monday(), 1);
        assert_eq!(schedule.entry("A1", monday()).unwrap().label(), "08:00-16:00");
        // everything is covered: least overlap wins, taken because A2 is below target
        assert_eq!(schedule.entry("A2", monday()).unwrap().label(), "06:00-13:30");
    }

    #[test]
    fn test_rest_rule() {
        let windows = WeeklyAvailability::new()
            .with_day(Weekday::Mon, DayWindow::continuous(840, 1320))
            .with_day(Weekday::Tue, DayWindow::continuous(360, 1320));
        let agent = Agent::new("A1", "ES")
            .with_contract(Contract::weekly(56.0).with_days_per_week(7).with_daily_bounds(8.0, 8.0))
            .with_windows(windows);

        let schedule = GreedyScheduler::new().schedule(&catalogs(&[agent], 2), &DemandForecast::new(), monday(), 2);
        let row = schedule.agent("A1").unwrap();
        let mon = row.entries[&monday()].as_work().unwrap();
        let tue = row.entries[&(monday() + chrono::Duration::days(1))].as_work().unwrap();
        assert_eq!(mon.end_min, 1320);
        assert_eq!(tue.start_min, 600);
    }

    #[test]
    fn test_weekend_rule_and_absence() {
        let all_week = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        let agent = Agent::new("A1", "ES")
            .with_contract(Contract::weekly(56.0).with_days_per_week(7))
            .with_windows(WeeklyAvailability::new().with_days(&all_week, DayWindow::continuous(480, 960)))
            .with_absence(Absence::new(monday(), monday() + chrono::Duration::days(3), AbsenceKind::Medical));

        let schedule = GreedyScheduler::new().schedule(&catalogs(&[agent], 7), &DemandForecast::new(), monday(), 7);
        let row = schedule.agent("A1").unwrap();
        assert_eq!(row.entries[&monday()].label(), "BMED");

        let sat = monday() + chrono::Duration::days(5);
        let sun = monday() + chrono::Duration::days(6);
        assert!(row.entries[&sat].as_work().is_some());
        assert!(row.entries[&sun].as_work().is_none());
    }

    proptest! {
        #[test]
        fn prop_random_rosters_pass_audit(
            windows in proptest::collection::vec(proptest::option::of((300i32..720, 240i32..600)), 7),
            hours in 16u32..48,
            days in 5u32..22,
        ) {
            let mut week = WeeklyAvailability::new();
            for (i, window) in windows.iter().enumerate() {
                if let Some((start, len)) = window {
                    let day = monday().checked_add_days(chrono::Days::new(i as u64)).unwrap().weekday();
                    week = week.with_day(day, DayWindow::continuous(*start, (*start + *len).min(1440)));
                }
            }
            let agent = Agent::new("A1", "ES").with_contract(Contract::weekly(f64::from(hours))).with_windows(week);
            let agents = [agent];

            let schedule = GreedyScheduler::new().schedule(&catalogs(&agents, days), &DemandForecast::new(), monday(), days);
            let row = schedule.agent("A1").unwrap();
            prop_assert_eq!(row.entries.len(), days as usize);
            prop_assert!(audit_schedule(&schedule, &agents, &RulesConfig::default()).is_empty());
        }
    }
}
