//! Agent model.
//!
//! An agent is a person who can be rostered: identity, employment
//! contract, legal country variant, weekly availability, optional forced
//! shift and absence intervals. Agents are supplied by the roster import
//! collaborator and are read-only for the duration of a scheduling run.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::WeeklyAvailability;

/// An agent that can be assigned shifts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Employment contract. `None` = agent cannot be scheduled.
    pub contract: Option<Contract>,
    /// Country code selecting the legal rule variant (e.g. `ES`, `CO`).
    pub country: String,
    /// Per-weekday availability.
    #[serde(default)]
    pub windows: WeeklyAvailability,
    /// Shift that overrides the catalog when it fits the day's window.
    #[serde(default)]
    pub forced_shift: Option<String>,
    /// Absence intervals (inclusive date ranges).
    #[serde(default)]
    pub absences: Vec<Absence>,
    /// What-if scenario tag; `None` = official roster.
    #[serde(default)]
    pub scenario: Option<String>,
    /// Per-agent Sunday cap override.
    #[serde(default)]
    pub max_sundays: Option<u32>,
    /// Learned shift preferences.
    #[serde(default)]
    pub preferences: Vec<ShiftPreference>,
}

/// Contractual working-time terms.
///
/// Unset daily bounds and work days fall back to the agent's country policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Contracted hours per week.
    pub weekly_hours: f64,
    /// Nominal working days per week.
    #[serde(default)]
    pub days_per_week: Option<u32>,
    /// Shortest allowed daily shift (hours).
    #[serde(default)]
    pub min_daily_hours: Option<f64>,
    /// Longest allowed daily shift (hours).
    #[serde(default)]
    pub max_daily_hours: Option<f64>,
}

/// An absence interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absence {
    /// First absent date.
    pub start: NaiveDate,
    /// Last absent date (inclusive).
    pub end: NaiveDate,
    /// Absence classification.
    pub kind: AbsenceKind,
    /// Original incident text.
    #[serde(default)]
    pub description: String,
}

/// Absence classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AbsenceKind {
    /// Paid leave (VAC).
    Vacation,
    /// Sick leave and medical incidents (BMED).
    Medical,
    /// Anything else (AUS).
    Other,
}

/// A learned preference for a shift on a weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftPreference {
    /// Weekday the preference applies to.
    pub weekday: Weekday,
    /// Shift label (`HH:MM-HH:MM`).
    pub label: String,
    /// Objective bonus when the shift is chosen.
    pub weight: i64,
}

impl Agent {
    /// Creates an agent with no contract and all days closed.
    pub fn new(id: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            contract: None,
            country: country.into(),
            windows: WeeklyAvailability::new(),
            forced_shift: None,
            absences: Vec::new(),
            scenario: None,
            max_sundays: None,
            preferences: Vec::new(),
        }
    }

    /// Sets the agent name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the contract.
    pub fn with_contract(mut self, contract: Contract) -> Self {
        self.contract = Some(contract);
        self
    }

    /// Sets the weekly availability.
    pub fn with_windows(mut self, windows: WeeklyAvailability) -> Self {
        self.windows = windows;
        self
    }

    /// Sets the forced shift.
    pub fn with_forced_shift(mut self, shift: impl Into<String>) -> Self {
        self.forced_shift = Some(shift.into());
        self
    }

    /// Adds an absence.
    pub fn with_absence(mut self, absence: Absence) -> Self {
        self.absences.push(absence);
        self
    }

    /// Tags the agent with a what-if scenario.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    /// Overrides the Sunday cap.
    pub fn with_max_sundays(mut self, max: u32) -> Self {
        self.max_sundays = Some(max);
        self
    }

    /// Adds a shift preference.
    pub fn with_preference(mut self, weekday: Weekday, label: impl Into<String>, weight: i64) -> Self {
        self.preferences.push(ShiftPreference {
            weekday,
            label: label.into(),
            weight,
        });
        self
    }

    /// Absence covering `date`, if any. Later entries win on overlap.
    pub fn absence_on(&self, date: NaiveDate) -> Option<&Absence> {
        self.absences.iter().rev().find(|a| a.covers(date))
    }

    /// Preference bonus for a shift label on a weekday (0 if none).
    pub fn preference_weight(&self, weekday: Weekday, label: &str) -> i64 {
        self.preferences
            .iter()
            .filter(|p| p.weekday == weekday && p.label == label)
            .map(|p| p.weight)
            .sum()
    }

    /// Contract usable for scheduling (positive weekly hours).
    pub fn usable_contract(&self) -> Option<&Contract> {
        self.contract.as_ref().filter(|c| c.weekly_hours > 0.0)
    }
}

impl Contract {
    /// Creates a contract with the given weekly hours; other terms
    /// come from the country policy.
    pub fn weekly(hours: f64) -> Self {
        Self {
            weekly_hours: hours,
            days_per_week: None,
            min_daily_hours: None,
            max_daily_hours: None,
        }
    }

    /// Sets nominal working days per week.
    pub fn with_days_per_week(mut self, days: u32) -> Self {
        self.days_per_week = Some(days);
        self
    }

    /// Sets the daily hour bounds.
    pub fn with_daily_bounds(mut self, min_hours: f64, max_hours: f64) -> Self {
        self.min_daily_hours = Some(min_hours);
        self.max_daily_hours = Some(max_hours);
        self
    }

    /// Target minutes over a horizon of `days` days (truncated).
    pub fn target_minutes(&self, days: u32) -> i64 {
        (self.weekly_hours * (f64::from(days) / 7.0) * 60.0) as i64
    }
}

impl Absence {
    /// Creates an absence.
    pub fn new(start: NaiveDate, end: NaiveDate, kind: AbsenceKind) -> Self {
        Self {
            start,
            end,
            kind,
            description: String::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether `date` falls within the interval.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl AbsenceKind {
    /// Short code used in schedule labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Vacation => "VAC",
            Self::Medical => "BMED",
            Self::Other => "AUS",
        }
    }

    /// Classifies a free-text incident name.
    pub fn classify(raw: &str) -> Self {
        const VACATION: &[&str] = &["VAC", "DISFRUTE", "COMPENSADO"];
        const MEDICAL: &[&str] = &[
            "ENFERMEDAD", "HOSPITAL", "MEDIC", "BAJA", "INCAPACIDAD", "MATERNIDAD",
            "PATERNIDAD", "RIESGO", "ACCIDENTE", "PARENTAL", "NACIMIENTO", "QUIRURG",
            "MUTUA", "SALUD", "REPOSO", "INTERVENCION", "CONSULTA", "MALESTAR", "DOLOR",
            "GRIPE", "COVID",
        ];

        let upper = raw.trim().to_uppercase();
        if VACATION.iter().any(|k| upper.contains(k)) {
            Self::Vacation
        } else if MEDICAL.iter().any(|k| upper.contains(k))
            || upper.split(|c: char| !c.is_alphanumeric()).any(|w| w == "IT")
        {
            Self::Medical
        } else {
            Self::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayWindow;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn test_agent_builder() {
        let a = Agent::new("A1", "ES")
            .with_name("Ana")
            .with_contract(Contract::weekly(40.0).with_days_per_week(5))
            .with_windows(WeeklyAvailability::new().with_day(Weekday::Mon, DayWindow::continuous(480, 960)))
            .with_forced_shift("08:00-16:00")
            .with_scenario("what-if")
            .with_max_sundays(10);

        assert_eq!(a.id, "A1");
        assert_eq!(a.name, "Ana");
        assert_eq!(a.country, "ES");
        assert_eq!(a.forced_shift.as_deref(), Some("08:00-16:00"));
        assert_eq!(a.scenario.as_deref(), Some("what-if"));
        assert_eq!(a.max_sundays, Some(10));
        assert!(a.usable_contract().is_some());
    }

    #[test]
    fn test_usable_contract() {
        assert!(Agent::new("A", "ES").usable_contract().is_none());
        let zero = Agent::new("A", "ES").with_contract(Contract::weekly(0.0));
        assert!(zero.usable_contract().is_none());
    }

    #[test]
    fn test_absence_lookup() {
        let a = Agent::new("A1", "ES")
            .with_absence(Absence::new(d(3), d(5), AbsenceKind::Vacation))
            .with_absence(Absence::new(d(5), d(5), AbsenceKind::Medical));

        assert!(a.absence_on(d(2)).is_none());
        assert_eq!(a.absence_on(d(3)).unwrap().kind, AbsenceKind::Vacation);
        assert_eq!(a.absence_on(d(5)).unwrap().kind, AbsenceKind::Medical);
        assert!(a.absence_on(d(6)).is_none());
    }

    #[test]
    fn test_target_minutes() {
        assert_eq!(Contract::weekly(40.0).target_minutes(7), 2400);
        // 40h over 30 days = 171.43h → truncated minutes
        assert_eq!(Contract::weekly(40.0).target_minutes(30), 10285);
    }

    #[test]
    fn test_absence_classification() {
        assert_eq!(AbsenceKind::classify("Vacaciones 2025"), AbsenceKind::Vacation);
        assert_eq!(AbsenceKind::classify("disfrute festivo"), AbsenceKind::Vacation);
        assert_eq!(AbsenceKind::classify("BAJA POR ENFERMEDAD"), AbsenceKind::Medical);
        assert_eq!(AbsenceKind::classify("IT"), AbsenceKind::Medical);
        assert_eq!(AbsenceKind::classify("Permiso sin sueldo"), AbsenceKind::Other);
        assert_eq!(AbsenceKind::Medical.code(), "BMED");
    }

    #[test]
    fn test_preference_weight() {
        let a = Agent::new("A", "ES").with_preference(Weekday::Tue, "09:00-17:00", 100);
        assert_eq!(a.preference_weight(Weekday::Tue, "09:00-17:00"), 100);
        assert_eq!(a.preference_weight(Weekday::Wed, "09:00-17:00"), 0);
    }
}
