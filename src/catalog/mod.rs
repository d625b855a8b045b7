//! Shift catalog generation.
//!
//! Expands an agent's availability for one date into the finite set of
//! shifts either engine may assign. The order of the returned list is the
//! tie-break order of both engines: longer shifts first, earlier starts
//! first within a length.
//!
//! # Rules
//! 1. The weekday window is used, weekend days falling back to a nearby
//!    weekday window (see [`WeeklyAvailability::effective`](crate::models::WeeklyAvailability::effective)).
//! 2. A non-split forced shift that fits inside one window segment is the
//!    only candidate.
//! 3. A split window is one candidate, accepted when its worked hours lie
//!    within the daily bounds.
//! 4. A continuous window yields every 30-minute-aligned placement of each
//!    duration in {target, target + 0.5h, target − 0.5h} within the bounds.

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::error::Result;
use crate::models::{horizon_dates, Absence, Agent, DayWindow, ShiftCandidate, TimeWindow};
use crate::rules::AgentTerms;

/// Placement grid for shift starts and durations (minutes).
pub const SHIFT_GRID_MINUTES: i32 = 30;

/// One agent's choices for one date.
#[derive(Debug, Clone)]
pub struct DayOptions {
    /// The date.
    pub date: NaiveDate,
    /// Absence covering the date. Absent days have no candidates.
    pub absence: Option<Absence>,
    /// Candidate shifts in tie-break order.
    pub candidates: Vec<ShiftCandidate>,
    /// Preference weight of each candidate, aligned with `candidates`.
    pub preferences: Vec<i64>,
}

impl DayOptions {
    /// Whether the agent can be given a shift on this date.
    pub fn is_open(&self) -> bool {
        self.absence.is_none() && !self.candidates.is_empty()
    }
}

/// One agent's choices over the whole horizon.
#[derive(Debug, Clone)]
pub struct AgentCatalog {
    /// Agent identifier.
    pub agent_id: String,
    /// Resolved contract and country rules.
    pub terms: AgentTerms,
    /// One entry per horizon date, chronological.
    pub days: Vec<DayOptions>,
}

impl AgentCatalog {
    /// Total number of candidates over the horizon.
    pub fn candidate_count(&self) -> usize {
        self.days.iter().map(|d| d.candidates.len()).sum()
    }
}

/// Builds shift candidates for (agent, date) pairs.
#[derive(Debug, Clone)]
pub struct ShiftCatalogBuilder {
    grid_minutes: i32,
}

impl Default for ShiftCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShiftCatalogBuilder {
    /// Creates a builder on the 30-minute grid.
    pub fn new() -> Self {
        Self {
            grid_minutes: SHIFT_GRID_MINUTES,
        }
    }

    /// Overrides the placement grid.
    pub fn with_grid(mut self, minutes: i32) -> Self {
        self.grid_minutes = minutes.max(1);
        self
    }

    /// Candidate shifts for `agent` on `date`. Empty = the agent is off.
    pub fn build(&self, agent: &Agent, terms: &AgentTerms, date: NaiveDate) -> Vec<ShiftCandidate> {
        let window = agent.windows.effective(date.weekday());
        if window.is_closed() {
            return Vec::new();
        }

        if let Some(forced) = self.forced_candidate(agent, window) {
            return vec![forced];
        }

        let min_minutes = terms.min_daily_hours * 60.0;
        let max_minutes = terms.max_daily_hours * 60.0;

        if window.is_split() {
            let total = f64::from(window.total_minutes());
            return if total >= min_minutes && total <= max_minutes {
                ShiftCandidate::from_window(window).into_iter().collect()
            } else {
                Vec::new()
            };
        }

        let segment = window.segments[0];
        let mut candidates: Vec<ShiftCandidate> = Vec::new();
        for duration in self.durations(terms) {
            let mut start = segment.start_min;
            while start + duration <= segment.end_min {
                let c = ShiftCandidate::continuous(start, start + duration);
                if !candidates.iter().any(|x| x.key() == c.key()) {
                    candidates.push(c);
                }
                start += self.grid_minutes;
            }
        }
        candidates
    }

    /// Candidates for every date of the horizon.
    pub fn build_horizon(&self, agent: &Agent, terms: AgentTerms, start: NaiveDate, days: u32) -> AgentCatalog {
        let days = horizon_dates(start, days)
            .map(|date| match agent.absence_on(date) {
                Some(absence) => DayOptions {
                    date,
                    absence: Some(absence.clone()),
                    candidates: Vec::new(),
                    preferences: Vec::new(),
                },
                None => {
                    let candidates = self.build(agent, &terms, date);
                    let preferences = candidates
                        .iter()
                        .map(|c| agent.preference_weight(date.weekday(), &c.label))
                        .collect();
                    DayOptions {
                        date,
                        absence: None,
                        candidates,
                        preferences,
                    }
                }
            })
            .collect();
        AgentCatalog {
            agent_id: agent.id.clone(),
            terms,
            days,
        }
    }

    /// Candidate durations in minutes, longest first.
    fn durations(&self, terms: &AgentTerms) -> Vec<i32> {
        let (lo, hi) = (terms.min_daily_hours, terms.max_daily_hours);
        let target = terms.daily_target_hours;

        let mut hours: Vec<f64> = [target, target + 0.5, target - 0.5]
            .into_iter()
            .filter(|h| *h >= lo && *h <= hi)
            .collect();
        if hours.is_empty() {
            hours.push(target.clamp(lo.min(hi), hi.max(lo)));
        }

        let mut minutes: Vec<i32> = hours
            .into_iter()
            .map(|h| ((h * 60.0).round() as i32 / self.grid_minutes) * self.grid_minutes)
            .filter(|m| *m > 0)
            .collect();
        minutes.sort_unstable_by(|a, b| b.cmp(a));
        minutes.dedup();
        minutes
    }

    fn forced_candidate(&self, agent: &Agent, window: &DayWindow) -> Option<ShiftCandidate> {
        let raw = agent.forced_shift.as_deref()?.trim();
        if raw.is_empty() || raw.contains('/') {
            return None;
        }
        match TimeWindow::parse(raw) {
            Ok(tw) if window.fits(&tw) => Some(ShiftCandidate::continuous(tw.start_min, tw.end_min)),
            Ok(_) => None,
            Err(e) => {
                debug!(agent = %agent.id, forced = raw, error = %e, "ignoring unparseable forced shift");
                None
            }
        }
    }
}

/// Turns a suggested shift into a forced shift when it reproduces the
/// contract: `|daily hours × workdays − contract hours| < 0.5`.
///
/// Returns the normalized shift label, or `None` when the suggestion is
/// closed or does not match the contract.
pub fn forced_shift_from_suggestion(suggested: &str, contract_hours: f64, workdays: u32) -> Result<Option<String>> {
    let window = DayWindow::parse(suggested)?;
    if window.is_closed() {
        return Ok(None);
    }
    let projected = f64::from(window.total_minutes()) / 60.0 * f64::from(workdays);
    if (projected - contract_hours).abs() < 0.5 {
        Ok(Some(window.label()))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contract, WeeklyAvailability};
    use crate::rules::RulesConfig;
    use chrono::Weekday;

    const WEEKDAYS: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn agent(window: DayWindow, contract: Contract) -> Agent {
        Agent::new("A1", "ES")
            .with_contract(contract)
            .with_windows(WeeklyAvailability::new().with_days(&WEEKDAYS, window))
    }

    fn build(agent: &Agent, date: NaiveDate) -> Vec<ShiftCandidate> {
        let terms = RulesConfig::default().terms_for(agent, monday(), 7).unwrap();
        ShiftCatalogBuilder::new().build(agent, &terms, date)
    }

    fn labels(c: &[ShiftCandidate]) -> Vec<&str> {
        c.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn test_exact_window() {
        let a = agent(DayWindow::continuous(480, 960), Contract::weekly(40.0));
        let c = build(&a, monday());
        // 8h exactly fits once, 7.5h fits twice, 8.5h is above the ES max
        assert_eq!(labels(&c), vec!["08:00-16:00", "08:00-15:30", "08:30-16:00"]);
    }

    #[test]
    fn test_wide_window_enumerates_starts() {
        let a = agent(DayWindow::continuous(420, 1020), Contract::weekly(30.0));
        let c = build(&a, monday());
        // target 6h: durations 6.5h, 6h, 5.5h
        assert_eq!(c[0].duration_minutes, 390);
        assert_eq!(c[0].label, "07:00-13:30");
        assert!(c.windows(2).all(|w| w[0].duration_minutes >= w[1].duration_minutes));
        assert!(c.iter().all(|s| s.start_min >= 420 && s.end_min <= 1020));
        assert!(c.iter().all(|s| (s.start_min - 420) % 30 == 0));
        // 600-minute window: 8 + 9 + 10 placements
        assert_eq!(c.len(), 8 + 9 + 10);
    }

    #[test]
    fn test_target_out_of_bounds_clamps() {
        let a = agent(
            DayWindow::continuous(480, 1080),
            Contract::weekly(50.0).with_daily_bounds(4.0, 8.0),
        );
        let c = build(&a, monday());
        // target 10h clamps to 8h
        assert!(c.iter().all(|s| s.duration_minutes == 480));
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn test_split_window() {
        let split = DayWindow::parse("09:00-13:00/15:00-19:00").unwrap();
        let c = build(&agent(split.clone(), Contract::weekly(40.0)), monday());
        assert_eq!(c.len(), 1);
        assert!(c[0].is_split());
        assert_eq!(c[0].duration_minutes, 480);

        let long = DayWindow::parse("07:00-13:00/15:00-20:00").unwrap(); // 11h
        assert!(build(&agent(long, Contract::weekly(40.0)), monday()).is_empty());
    }

    #[test]
    fn test_forced_shift_priority() {
        let a = agent(DayWindow::continuous(420, 1080), Contract::weekly(40.0)).with_forced_shift("09:00-17:00");
        let c = build(&a, monday());
        assert_eq!(labels(&c), vec!["09:00-17:00"]);

        // does not fit: normal catalog
        let a = agent(DayWindow::continuous(600, 1080), Contract::weekly(40.0)).with_forced_shift("09:00-17:00");
        assert!(build(&a, monday()).len() > 1);

        // split forced shifts do not override
        let a = agent(DayWindow::continuous(420, 1080), Contract::weekly(40.0))
            .with_forced_shift("09:00-13:00/14:00-18:00");
        assert!(build(&a, monday()).len() > 1);

        // garbage is ignored
        let a = agent(DayWindow::continuous(420, 1080), Contract::weekly(40.0)).with_forced_shift("soon");
        assert!(build(&a, monday()).len() > 1);
    }

    #[test]
    fn test_weekend_fallback_and_closed_days() {
        let a = agent(DayWindow::continuous(480, 960), Contract::weekly(40.0));
        let sat = monday() + chrono::Duration::days(5);
        assert_eq!(build(&a, sat)[0].label, "08:00-16:00"); // Friday's window

        let mut b = a.clone();
        b.windows = WeeklyAvailability::new().with_day(Weekday::Mon, DayWindow::continuous(480, 960));
        let wed = monday() + chrono::Duration::days(2);
        assert!(build(&b, wed).is_empty());
    }

    #[test]
    fn test_horizon_marks_absences() {
        let monday_off = Absence::new(monday(), monday(), crate::models::AbsenceKind::Medical);
        let a = agent(DayWindow::continuous(480, 960), Contract::weekly(40.0))
            .with_absence(monday_off)
            .with_preference(Weekday::Tue, "08:00-16:00", 7);
        let terms = RulesConfig::default().terms_for(&a, monday(), 7).unwrap();
        let cat = ShiftCatalogBuilder::new().build_horizon(&a, terms, monday(), 7);

        assert_eq!(cat.days.len(), 7);
        assert!(!cat.days[0].is_open());
        assert!(cat.days[0].absence.is_some());
        assert!(cat.days[1].is_open());
        assert_eq!(cat.days[1].preferences, vec![7, 0, 0]);
        // weekend falls back to Friday's window
        assert_eq!(cat.candidate_count(), 6 * 3);
    }

    #[test]
    fn test_forced_shift_from_suggestion() {
        assert_eq!(
            forced_shift_from_suggestion("08:00-16:00", 40.0, 5).unwrap().as_deref(),
            Some("08:00-16:00")
        );
        assert_eq!(forced_shift_from_suggestion("08:00-15:00", 40.0, 5).unwrap(), None);
        assert_eq!(
            forced_shift_from_suggestion("09:00-13:00/14:00-18:00", 40.0, 5).unwrap().as_deref(),
            Some("09:00-13:00/14:00-18:00")
        );
        assert_eq!(forced_shift_from_suggestion("LIBRE", 40.0, 5).unwrap(), None);
        assert!(forced_shift_from_suggestion("8-16", 40.0, 5).is_err());
    }
}
