//! Input validation and schedule audit.
//!
//! [`validate_input`] checks the structural integrity of a roster and its
//! demand before scheduling. Detects:
//! - Duplicate agent IDs
//! - Agents without a usable contract (warning: the agent is skipped)
//! - Absences ending before they start
//! - Demand days without exactly 48 half-hour buckets
//! - Negative or non-finite volumes and handle times
//!
//! [`audit_schedule`] re-checks a produced schedule against the rules and
//! reports every breach as a [`Violation`].

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::warn;

use crate::models::{Agent, AgentSchedule, DemandForecast, Schedule, Violation, MINUTES_PER_DAY, SLOTS_PER_DAY};
use crate::rules::{RulesConfig, WeekKey, MIN_REST_MINUTES};

/// Validation result: `Err` carries the error-level findings.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Finding category.
    pub kind: ValidationErrorKind,
    /// Whether the run can proceed.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two agents share the same ID.
    DuplicateId,
    /// An agent has no contract or zero weekly hours.
    MissingContract,
    /// An absence ends before it starts.
    InvertedAbsence,
    /// A demand day does not have one bucket per half hour.
    MalformedDemandDay,
    /// A bucket has negative or non-finite calls or AHT.
    InvalidDemandValue,
}

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Reported and absorbed.
    Warning,
    /// Makes the run meaningless.
    Error,
}

impl ValidationError {
    fn error(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    /// Whether the finding blocks a run.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Returns every finding on the roster and demand, warnings included.
pub fn validate_input(agents: &[Agent], demand: &DemandForecast) -> Vec<ValidationError> {
    let mut findings = Vec::new();

    let mut ids = HashSet::new();
    for agent in agents {
        if !ids.insert(agent.id.as_str()) {
            findings.push(ValidationError::error(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate agent ID: {}", agent.id),
            ));
        }
        if agent.usable_contract().is_none() {
            findings.push(ValidationError::warning(
                ValidationErrorKind::MissingContract,
                format!("Agent '{}' has no usable contract and will not be scheduled", agent.id),
            ));
        }
        for absence in agent.absences.iter().filter(|a| a.end < a.start) {
            findings.push(ValidationError::error(
                ValidationErrorKind::InvertedAbsence,
                format!(
                    "Agent '{}' has an absence ending {} before it starts {}",
                    agent.id, absence.end, absence.start
                ),
            ));
        }
    }

    for (date, day) in &demand.days {
        if day.slots.len() != SLOTS_PER_DAY {
            findings.push(ValidationError::error(
                ValidationErrorKind::MalformedDemandDay,
                format!("Demand for {date} has {} buckets, expected {SLOTS_PER_DAY}", day.slots.len()),
            ));
        }
        let bad = |v: f64| !v.is_finite() || v < 0.0;
        if let Some(idx) = day.slots.iter().position(|s| bad(s.calls) || bad(s.aht)) {
            findings.push(ValidationError::error(
                ValidationErrorKind::InvalidDemandValue,
                format!("Demand for {date} bucket {idx} has invalid calls or AHT"),
            ));
        }
    }

    findings
}

/// Validates the input, logging warnings.
///
/// # Returns
/// `Ok(())` unless an error-level finding exists; `Err` holds only those.
pub fn check_input(agents: &[Agent], demand: &DemandForecast) -> ValidationResult {
    let (errors, warnings): (Vec<_>, Vec<_>) = validate_input(agents, demand).into_iter().partition(ValidationError::is_error);
    for w in &warnings {
        warn!(kind = ?w.kind, "{}", w.message);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Re-checks a schedule against the rules.
///
/// Contract-dependent checks (weekly caps, Sundays, hours) are skipped for
/// agents that are not in `agents` or have no usable contract.
pub fn audit_schedule(schedule: &Schedule, agents: &[Agent], rules: &RulesConfig) -> Vec<Violation> {
    let by_id: HashMap<&str, &Agent> = agents.iter().map(|a| (a.id.as_str(), a)).collect();
    let mut violations = Vec::new();

    for row in &schedule.agents {
        audit_rest(row, &mut violations);
        audit_activities(row, &mut violations);

        let Some(terms) = by_id
            .get(row.agent_id.as_str())
            .and_then(|a| rules.terms_for(a, schedule.start_date, schedule.days))
        else {
            continue;
        };
        let id = row.agent_id.as_str();

        let mut weeks: BTreeMap<WeekKey, (Vec<NaiveDate>, bool)> = BTreeMap::new();
        for (date, shift) in row.work_days() {
            let week = weeks.entry(WeekKey::of(date)).or_default();
            week.0.push(date);
            week.1 |= terms.policy.is_long_shift(shift.duration_minutes);
        }
        for (dates, has_long) in weeks.values() {
            let cap = terms.week_cap(*has_long) as usize;
            if let Some(date) = dates.get(cap) {
                violations.push(Violation::weekly_day_cap(
                    id,
                    *date,
                    format!("{} worked days in the week, cap {cap}", dates.len()),
                ));
            }
        }

        let worked = |d: NaiveDate| row.entries.get(&d).is_some_and(|e| e.as_work().is_some());
        let mut sundays = 0;
        for (date, _) in row.work_days().filter(|(d, _)| d.weekday() == Weekday::Sun) {
            sundays += 1;
            if sundays == terms.sunday_cap + 1 {
                violations.push(Violation::sunday_cap(
                    id,
                    date,
                    format!("Sunday cap of {} exceeded", terms.sunday_cap),
                ));
            }
            if !terms.relax_weekend && worked(date - Duration::days(1)) {
                violations.push(Violation::weekend_policy(id, date, "Saturday and Sunday both worked"));
            }
        }

        let minutes = row.worked_minutes();
        if minutes > terms.max_minutes {
            violations.push(Violation::hours_exceeded(
                id,
                format!("{minutes} minutes worked, at most {} allowed", terms.max_minutes),
            ));
        }
    }

    violations
}

fn audit_rest(row: &AgentSchedule, out: &mut Vec<Violation>) {
    let mut previous: Option<(NaiveDate, i32)> = None;
    for (date, shift) in row.work_days() {
        if let Some((prev_date, prev_end)) = previous {
            let gap = (date - prev_date).num_days() as i32 * MINUTES_PER_DAY + shift.start_min - prev_end;
            if gap < MIN_REST_MINUTES {
                out.push(Violation::rest_gap(
                    &row.agent_id,
                    date,
                    format!("{gap} minutes of rest after the previous shift"),
                ));
            }
        }
        previous = Some((date, shift.end_min));
    }
}

fn audit_activities(row: &AgentSchedule, out: &mut Vec<Violation>) {
    for (date, shift) in row.work_days() {
        for (i, act) in shift.activities.iter().enumerate() {
            if !shift.encloses(act.start, act.end) {
                out.push(Violation::activity_outside(
                    &row.agent_id,
                    date,
                    format!("{:?} at {}-{} outside the shift", act.kind, act.start, act.end),
                ));
            }
            if shift.activities[i + 1..].iter().any(|other| act.overlaps(other)) {
                out.push(Violation::activity_overlap(
                    &row.agent_id,
                    date,
                    format!("{:?} at {}-{} overlaps another activity", act.kind, act.start, act.end),
                ));
            }
        }
    }
}
