//! Schedule (solution) model.
//!
//! A schedule maps every (agent, date) of the horizon to exactly one
//! entry: a worked shift with its activities, a day off, or an absence.
//! Audits of a produced schedule are reported as [`Violation`]s.
//!
//! # Reference
//! Ernst et al. (2004), "Staff scheduling and rostering: A review of
//! applications, methods and models", EJOR 153(1)

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{AbsenceKind, ShiftCandidate, TimeWindow};

/// A complete roster over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// First date of the horizon.
    pub start_date: NaiveDate,
    /// Horizon length in days.
    pub days: u32,
    /// Per-agent entries, in roster order.
    pub agents: Vec<AgentSchedule>,
}

/// All entries of one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSchedule {
    /// Agent identifier.
    pub agent_id: String,
    /// One entry per horizon date.
    pub entries: BTreeMap<NaiveDate, ScheduleEntry>,
}

/// What an agent does on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ScheduleEntry {
    /// A worked shift.
    Work(WorkShift),
    /// Not scheduled.
    Off,
    /// Absent (vacation, sick leave, ...).
    Absence {
        /// Classification.
        kind: AbsenceKind,
        /// Original incident text.
        #[serde(default)]
        description: String,
    },
}

/// A worked shift and the activities placed inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkShift {
    /// Shift label.
    pub label: String,
    /// First worked minute.
    pub start_min: i32,
    /// End of the last segment.
    pub end_min: i32,
    /// Worked minutes.
    pub duration_minutes: i32,
    /// Worked segments (more than one for split shifts).
    pub segments: Vec<TimeWindow>,
    /// Breaks and PVDs, ordered by start.
    #[serde(default)]
    pub activities: Vec<Activity>,
    /// Activities were edited by hand and must not be regenerated.
    #[serde(default)]
    pub manual_activities: bool,
}

/// A break placed inside a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Break type.
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// Start minute.
    pub start: i32,
    /// End minute (exclusive).
    pub end: i32,
}

/// Break types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityKind {
    /// Main rest break.
    Break,
    /// Short personal break.
    Pvd,
}

/// A rule breach found by auditing a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Agent the violation belongs to.
    pub agent_id: String,
    /// Date the violation was detected on.
    pub date: Option<NaiveDate>,
    /// Human-readable description.
    pub message: String,
    /// Severity (0-100, higher = worse).
    pub severity: i32,
}

/// Classification of schedule violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    /// Less than 12 hours between consecutive shifts.
    RestGap,
    /// Too many worked days in one ISO week.
    WeeklyDayCap,
    /// Both Saturday and Sunday worked in one ISO week.
    WeekendPolicy,
    /// Too many Sundays worked over the horizon.
    SundayCap,
    /// Worked minutes above target plus tolerance.
    HoursExceeded,
    /// An activity not strictly inside its shift.
    ActivityOutsideShift,
    /// Two activities of a shift overlap.
    ActivityOverlap,
}

impl Schedule {
    /// Creates an empty schedule over `days` days from `start_date`.
    pub fn new(start_date: NaiveDate, days: u32) -> Self {
        Self {
            start_date,
            days,
            agents: Vec::new(),
        }
    }

    /// Horizon dates in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        horizon_dates(self.start_date, self.days)
    }

    /// Adds an agent's entries.
    pub fn add_agent(&mut self, agent: AgentSchedule) {
        self.agents.push(agent);
    }

    /// Entries of one agent.
    pub fn agent(&self, agent_id: &str) -> Option<&AgentSchedule> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }

    /// Mutable entries of one agent.
    pub fn agent_mut(&mut self, agent_id: &str) -> Option<&mut AgentSchedule> {
        self.agents.iter_mut().find(|a| a.agent_id == agent_id)
    }

    /// Entry for one agent on one date.
    pub fn entry(&self, agent_id: &str, date: NaiveDate) -> Option<&ScheduleEntry> {
        self.agent(agent_id)?.entries.get(&date)
    }

    /// Every worked shift on a date.
    pub fn shifts_on(&self, date: NaiveDate) -> impl Iterator<Item = &WorkShift> + '_ {
        self.agents
            .iter()
            .filter_map(move |a| a.entries.get(&date).and_then(ScheduleEntry::as_work))
    }

    /// Total worked minutes across all agents.
    pub fn total_worked_minutes(&self) -> i64 {
        self.agents.iter().map(AgentSchedule::worked_minutes).sum()
    }

    /// Number of agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

/// `days` consecutive dates from `start`.
pub fn horizon_dates(start: NaiveDate, days: u32) -> impl Iterator<Item = NaiveDate> {
    (0..i64::from(days)).map(move |i| start + Duration::days(i))
}

impl AgentSchedule {
    /// Creates an empty agent schedule.
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Sets the entry for a date.
    pub fn set(&mut self, date: NaiveDate, entry: ScheduleEntry) {
        self.entries.insert(date, entry);
    }

    /// Worked shifts in date order.
    pub fn work_days(&self) -> impl Iterator<Item = (NaiveDate, &WorkShift)> + '_ {
        self.entries
            .iter()
            .filter_map(|(d, e)| e.as_work().map(|w| (*d, w)))
    }

    /// Worked minutes over the horizon.
    pub fn worked_minutes(&self) -> i64 {
        self.work_days().map(|(_, w)| i64::from(w.duration_minutes)).sum()
    }

    /// Whether the agent works at all.
    pub fn is_active(&self) -> bool {
        self.work_days().next().is_some()
    }
}

impl ScheduleEntry {
    /// Absence entry.
    pub fn absence(kind: AbsenceKind, description: impl Into<String>) -> Self {
        Self::Absence {
            kind,
            description: description.into(),
        }
    }

    /// The worked shift, if any.
    pub fn as_work(&self) -> Option<&WorkShift> {
        match self {
            Self::Work(w) => Some(w),
            _ => None,
        }
    }

    /// Mutable worked shift, if any.
    pub fn as_work_mut(&mut self) -> Option<&mut WorkShift> {
        match self {
            Self::Work(w) => Some(w),
            _ => None,
        }
    }

    /// Display label: shift label, `OFF`, or the absence code.
    pub fn label(&self) -> &str {
        match self {
            Self::Work(w) => &w.label,
            Self::Off => "OFF",
            Self::Absence { kind, .. } => kind.code(),
        }
    }
}

impl WorkShift {
    /// A worked shift with no activities yet.
    pub fn from_candidate(candidate: &ShiftCandidate) -> Self {
        Self {
            label: candidate.label.clone(),
            start_min: candidate.start_min,
            end_min: candidate.end_min,
            duration_minutes: candidate.duration_minutes,
            segments: candidate.segments.clone(),
            activities: Vec::new(),
            manual_activities: false,
        }
    }

    /// Activities of one kind.
    pub fn activities_of(&self, kind: ActivityKind) -> impl Iterator<Item = &Activity> + '_ {
        self.activities.iter().filter(move |a| a.kind == kind)
    }

    /// Whether `[start, end)` lies inside one worked segment.
    pub fn encloses(&self, start: i32, end: i32) -> bool {
        let w = TimeWindow::new(start, end);
        self.segments.iter().any(|s| s.encloses(&w))
    }
}

impl From<&ShiftCandidate> for ScheduleEntry {
    fn from(candidate: &ShiftCandidate) -> Self {
        Self::Work(WorkShift::from_candidate(candidate))
    }
}

impl Activity {
    /// Creates an activity.
    pub fn new(kind: ActivityKind, start: i32, end: i32) -> Self {
        Self { kind, start, end }
    }

    /// Duration in minutes.
    #[inline]
    pub fn duration(&self) -> i32 {
        self.end - self.start
    }

    /// Whether two activities overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl Violation {
    fn new(
        violation_type: ViolationType,
        agent_id: impl Into<String>,
        date: Option<NaiveDate>,
        message: impl Into<String>,
        severity: i32,
    ) -> Self {
        Self {
            violation_type,
            agent_id: agent_id.into(),
            date,
            message: message.into(),
            severity,
        }
    }

    /// Creates a rest-gap violation.
    pub fn rest_gap(agent_id: impl Into<String>, date: NaiveDate, message: impl Into<String>) -> Self {
        Self::new(ViolationType::RestGap, agent_id, Some(date), message, 95)
    }

    /// Creates a weekly worked-day cap violation.
    pub fn weekly_day_cap(agent_id: impl Into<String>, date: NaiveDate, message: impl Into<String>) -> Self {
        Self::new(ViolationType::WeeklyDayCap, agent_id, Some(date), message, 90)
    }

    /// Creates a weekend-policy violation.
    pub fn weekend_policy(agent_id: impl Into<String>, date: NaiveDate, message: impl Into<String>) -> Self {
        Self::new(ViolationType::WeekendPolicy, agent_id, Some(date), message, 60)
    }

    /// Creates a Sunday cap violation.
    pub fn sunday_cap(agent_id: impl Into<String>, date: NaiveDate, message: impl Into<String>) -> Self {
        Self::new(ViolationType::SundayCap, agent_id, Some(date), message, 60)
    }

    /// Creates an hours-exceeded violation.
    pub fn hours_exceeded(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ViolationType::HoursExceeded, agent_id, None, message, 80)
    }

    /// Creates an activity-outside-shift violation.
    pub fn activity_outside(agent_id: impl Into<String>, date: NaiveDate, message: impl Into<String>) -> Self {
        Self::new(ViolationType::ActivityOutsideShift, agent_id, Some(date), message, 40)
    }

    /// Creates an activity-overlap violation.
    pub fn activity_overlap(agent_id: impl Into<String>, date: NaiveDate, message: impl Into<String>) -> Self {
        Self::new(ViolationType::ActivityOverlap, agent_id, Some(date), message, 40)
    }
}
