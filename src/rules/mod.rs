//! Legal and contractual rule table.
//!
//! Working-time law differs per country: how many days may be worked per
//! ISO week, whether a long shift shortens the week, how many Sundays may
//! be worked, daily hour bounds and how far an agent may fall short of or
//! exceed the contracted hours. These thresholds are data ([`CountryPolicy`])
//! looked up by country code, never inline conditionals in the engines.
//!
//! # Rest Rule
//! At least 12 hours (720 minutes) must separate the end of one day's shift
//! from the start of the next day's. With the previous shift ending at
//! minute `e` of its own day, the next day may start at
//! `max(0, 720 - (1440 - e))`.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::{horizon_dates, Agent, Contract, MINUTES_PER_DAY};

/// Minimum rest between consecutive shifts (minutes).
pub const MIN_REST_MINUTES: i32 = 720;

/// Earliest allowed start on a day, given the previous day's shift end.
///
/// `None` means the agent did not work the previous day.
pub fn earliest_start(previous_end: Option<i32>) -> i32 {
    match previous_end {
        Some(end) => (MIN_REST_MINUTES - (MINUTES_PER_DAY - end)).max(0),
        None => 0,
    }
}

/// ISO week identifier (`(iso_year, week)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekKey {
    /// ISO week-numbering year.
    pub year: i32,
    /// ISO week number (1..=53).
    pub week: u32,
}

impl WeekKey {
    /// ISO week of a date.
    pub fn of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

/// Per-country working-time thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryPolicy {
    /// Maximum worked days per ISO week.
    pub weekly_day_cap: u32,
    /// Shift length (minutes) that counts as a long shift, if the rule applies.
    pub long_shift_minutes: Option<i32>,
    /// Worked-day cap for a week containing a long shift.
    pub long_shift_day_cap: u32,
    /// Sunday cap imposed by law, overriding configuration.
    pub fixed_sunday_cap: Option<u32>,
    /// Nominal working days per week.
    pub days_per_week: u32,
    /// Default shortest daily shift (hours).
    pub min_daily_hours: f64,
    /// Default longest daily shift (hours).
    pub max_daily_hours: f64,
    /// Allowed shortfall below target over the horizon (minutes).
    pub tolerance_under_min: i64,
    /// Allowed excess above target over the horizon (minutes).
    pub tolerance_over_min: i64,
    /// Fraction of target below which the greedy engine takes a
    /// non-positive-score shift anyway.
    pub greedy_take_threshold: f64,
}

impl CountryPolicy {
    /// Spanish rules: 5-day week.
    pub fn spain() -> Self {
        Self {
            weekly_day_cap: 5,
            long_shift_minutes: None,
            long_shift_day_cap: 5,
            fixed_sunday_cap: None,
            days_per_week: 5,
            min_daily_hours: 4.0,
            max_daily_hours: 8.0,
            tolerance_under_min: 30,
            tolerance_over_min: 0,
            greedy_take_threshold: 1.0,
        }
    }

    /// Colombian rules: 6-day week, 5 when a 10h+ shift is worked.
    pub fn colombia() -> Self {
        Self {
            weekly_day_cap: 6,
            long_shift_minutes: Some(600),
            long_shift_day_cap: 5,
            fixed_sunday_cap: Some(2),
            days_per_week: 6,
            min_daily_hours: 4.0,
            max_daily_hours: 10.0,
            tolerance_under_min: 240,
            tolerance_over_min: 0,
            greedy_take_threshold: 0.95,
        }
    }

    /// Whether a shift of `minutes` triggers the long-shift week cap.
    pub fn is_long_shift(&self, minutes: i32) -> bool {
        self.long_shift_minutes.is_some_and(|t| minutes >= t)
    }
}

/// Country code → policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    policies: BTreeMap<String, CountryPolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
            .with_policy("ES", CountryPolicy::spain())
            .with_policy("CO", CountryPolicy::colombia())
    }
}

impl PolicyTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    /// Adds or replaces a country's policy.
    pub fn with_policy(mut self, country: impl Into<String>, policy: CountryPolicy) -> Self {
        self.policies.insert(country.into().to_uppercase(), policy);
        self
    }

    /// Policy for a country code, if known.
    pub fn get(&self, country: &str) -> Option<&CountryPolicy> {
        self.policies.get(&country.trim().to_uppercase())
    }
}

/// Rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Sunday cap over the horizon when the country does not fix one.
    pub max_sundays: u32,
    /// Allow working both Saturday and Sunday of a week.
    pub relax_weekend: bool,
    /// Country used for unknown codes.
    pub default_country: String,
    /// Per-country thresholds.
    pub policies: PolicyTable,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_sundays: 2,
            relax_weekend: false,
            default_country: "ES".to_string(),
            policies: PolicyTable::default(),
        }
    }
}

impl RulesConfig {
    /// Sets the Sunday cap.
    pub fn with_max_sundays(mut self, max: u32) -> Self {
        self.max_sundays = max;
        self
    }

    /// Allows full weekends.
    pub fn with_relaxed_weekend(mut self, relax: bool) -> Self {
        self.relax_weekend = relax;
        self
    }

    /// Sets the fallback country.
    pub fn with_default_country(mut self, country: impl Into<String>) -> Self {
        self.default_country = country.into();
        self
    }

    /// Replaces the policy table.
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Policy for a country, falling back to the default country and
    /// then to the Spanish rules.
    pub fn policy_for(&self, country: &str) -> CountryPolicy {
        self.policies
            .get(country)
            .or_else(|| self.policies.get(&self.default_country))
            .cloned()
            .unwrap_or_else(CountryPolicy::spain)
    }

    /// Resolves everything the engines need to know about one agent over
    /// `horizon_days` days from `start`.
    ///
    /// Absence days are taken out of the contracted target. Returns `None`
    /// when the agent has no usable contract.
    pub fn terms_for(&self, agent: &Agent, start: NaiveDate, horizon_days: u32) -> Option<AgentTerms> {
        let contract = agent.usable_contract()?;
        let absent = horizon_dates(start, horizon_days)
            .filter(|d| agent.absence_on(*d).is_some())
            .count() as u32;
        Some(AgentTerms::resolve(
            agent,
            contract,
            self.policy_for(&agent.country),
            horizon_days.saturating_sub(absent),
            self,
        ))
    }
}

/// Rules resolved for one agent over one horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTerms {
    /// Country policy in force.
    pub policy: CountryPolicy,
    /// Contracted minutes over the horizon.
    pub target_minutes: i64,
    /// Lower edge of the hours band.
    pub min_minutes: i64,
    /// Upper edge of the hours band.
    pub max_minutes: i64,
    /// Shortest daily shift (hours).
    pub min_daily_hours: f64,
    /// Longest daily shift (hours).
    pub max_daily_hours: f64,
    /// Nominal working days per week.
    pub days_per_week: u32,
    /// Ideal daily shift (weekly hours / days per week).
    pub daily_target_hours: f64,
    /// Sundays that may be worked over the horizon.
    pub sunday_cap: u32,
    /// Whether Saturday and Sunday of one week may both be worked.
    pub relax_weekend: bool,
}

impl AgentTerms {
    fn resolve(agent: &Agent, contract: &Contract, policy: CountryPolicy, available_days: u32, rules: &RulesConfig) -> Self {
        let target = contract.target_minutes(available_days);
        let sunday_cap = policy
            .fixed_sunday_cap
            .or(agent.max_sundays)
            .unwrap_or(rules.max_sundays);
        let days_per_week = contract.days_per_week.unwrap_or(policy.days_per_week).max(1);
        Self {
            target_minutes: target,
            min_minutes: (target - policy.tolerance_under_min).max(0),
            max_minutes: target + policy.tolerance_over_min,
            min_daily_hours: contract.min_daily_hours.unwrap_or(policy.min_daily_hours),
            max_daily_hours: contract.max_daily_hours.unwrap_or(policy.max_daily_hours),
            days_per_week,
            daily_target_hours: contract.weekly_hours / f64::from(days_per_week),
            sunday_cap,
            relax_weekend: rules.relax_weekend,
            policy,
        }
    }

    /// Worked-day cap for a week, given whether it contains a long shift.
    pub fn week_cap(&self, has_long_shift: bool) -> u32 {
        if has_long_shift {
            self.policy.long_shift_day_cap.min(self.policy.weekly_day_cap)
        } else {
            self.policy.weekly_day_cap
        }
    }
}

/// Whether a date is a Saturday or Sunday.
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Absence, AbsenceKind};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    #[test]
    fn test_earliest_start() {
        assert_eq!(earliest_start(None), 0);
        assert_eq!(earliest_start(Some(960)), 240); // 16:00 → 04:00
        assert_eq!(earliest_start(Some(600)), 0); // 10:00 → any
        assert_eq!(earliest_start(Some(1320)), 600); // 22:00 → 10:00
        assert_eq!(earliest_start(Some(1560)), 840); // 02:00 next day → 14:00
    }

    #[test]
    fn test_week_key() {
        let mon = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let sun = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let next = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(WeekKey::of(mon), WeekKey::of(sun));
        assert_ne!(WeekKey::of(sun), WeekKey::of(next));

        // 2024-12-30 belongs to ISO week 1 of 2025
        let k = WeekKey::of(NaiveDate::from_ymd_opt(2024, 12, 30).unwrap());
        assert_eq!(k, WeekKey { year: 2025, week: 1 });
    }

    #[test]
    fn test_policy_lookup_fallback() {
        let rules = RulesConfig::default();
        assert_eq!(rules.policy_for("co").weekly_day_cap, 6);
        assert_eq!(rules.policy_for("ES").weekly_day_cap, 5);
        assert_eq!(rules.policy_for("XX"), CountryPolicy::spain());

        let rules = RulesConfig::default().with_default_country("CO");
        assert_eq!(rules.policy_for("XX"), CountryPolicy::colombia());
    }

    #[test]
    fn test_long_shift() {
        let co = CountryPolicy::colombia();
        assert!(co.is_long_shift(600));
        assert!(!co.is_long_shift(570));
        assert!(!CountryPolicy::spain().is_long_shift(720));
    }

    #[test]
    fn test_terms_resolution() {
        let rules = RulesConfig::default().with_max_sundays(3);
        let es = Agent::new("A", "ES").with_contract(Contract::weekly(40.0));
        let t = rules.terms_for(&es, monday(), 7).unwrap();
        assert_eq!(t.target_minutes, 2400);
        assert_eq!(t.min_minutes, 2370);
        assert_eq!(t.max_minutes, 2400);
        assert_eq!(t.sunday_cap, 3);
        assert!((t.daily_target_hours - 8.0).abs() < 1e-10);
        assert_eq!(t.week_cap(false), 5);

        let es_override = es.clone().with_max_sundays(1);
        assert_eq!(rules.terms_for(&es_override, monday(), 7).unwrap().sunday_cap, 1);

        let co = Agent::new("B", "CO")
            .with_contract(Contract::weekly(46.0).with_daily_bounds(6.0, 10.0))
            .with_max_sundays(9);
        let t = rules.terms_for(&co, monday(), 7).unwrap();
        assert_eq!(t.sunday_cap, 2); // fixed by law
        assert_eq!(t.days_per_week, 6);
        assert_eq!(t.week_cap(true), 5);
        assert_eq!(t.week_cap(false), 6);
        assert!((t.min_daily_hours - 6.0).abs() < 1e-10);

        assert!(rules.terms_for(&Agent::new("C", "ES"), monday(), 7).is_none());
    }

    #[test]
    fn test_absences_reduce_target() {
        let rules = RulesConfig::default();
        let a = Agent::new("A", "ES")
            .with_contract(Contract::weekly(40.0))
            .with_absence(Absence::new(monday(), monday() + chrono::Duration::days(1), AbsenceKind::Vacation));
        let t = rules.terms_for(&a, monday(), 7).unwrap();
        // 40h over 5 available days
        assert_eq!(t.target_minutes, 1714);
    }
}
