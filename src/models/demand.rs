//! Forecast demand.
//!
//! Demand arrives per date as 48 half-hour buckets, each carrying the
//! forecast calls, the average handle time and the required-agent count
//! the forecasting collaborator computed (which may be missing).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Half-hour buckets per day.
pub const SLOTS_PER_DAY: usize = 48;

/// Minutes per forecast bucket.
pub const SLOT_MINUTES: i32 = 30;

/// One half-hour forecast bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementSlot {
    /// Forecast contacts in the bucket.
    pub calls: f64,
    /// Average handle time (seconds).
    pub aht: f64,
    /// Required agents (0 = not computed).
    #[serde(default)]
    pub required: f64,
}

impl RequirementSlot {
    /// Creates a bucket.
    pub fn new(calls: f64, aht: f64, required: f64) -> Self {
        Self {
            calls,
            aht,
            required,
        }
    }

    /// Whole agents the schedulers try to place (required rounded up).
    pub fn required_agents(&self) -> u32 {
        if self.required <= 0.0 {
            0
        } else {
            self.required.ceil() as u32
        }
    }
}

/// Demand for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDemand {
    /// Half-hour buckets, midnight first.
    pub slots: Vec<RequirementSlot>,
}

impl DayDemand {
    /// Creates a day from its buckets.
    pub fn new(slots: Vec<RequirementSlot>) -> Self {
        Self { slots }
    }

    /// A day where every bucket has the same forecast.
    pub fn flat(calls: f64, aht: f64, required: f64) -> Self {
        Self::new(vec![RequirementSlot::new(calls, aht, required); SLOTS_PER_DAY])
    }

    /// Bucket `idx`; missing buckets read as empty.
    pub fn slot(&self, idx: usize) -> RequirementSlot {
        self.slots.get(idx).copied().unwrap_or_default()
    }

    /// Largest bucket call volume.
    pub fn peak_calls(&self) -> f64 {
        self.slots.iter().map(|s| s.calls).fold(0.0, f64::max)
    }
}

/// Demand over the scheduling horizon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    /// Per-date demand.
    pub days: BTreeMap<NaiveDate, DayDemand>,
}

impl DemandForecast {
    /// Creates an empty forecast.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a day.
    pub fn with_day(mut self, date: NaiveDate, day: DayDemand) -> Self {
        self.days.insert(date, day);
        self
    }

    /// Demand for a date.
    pub fn day(&self, date: NaiveDate) -> Option<&DayDemand> {
        self.days.get(&date)
    }

    /// Bucket on a date; missing dates/buckets read as empty.
    pub fn slot(&self, date: NaiveDate, idx: usize) -> RequirementSlot {
        self.day(date).map(|d| d.slot(idx)).unwrap_or_default()
    }

    /// Largest bucket volume over the given dates, at least 1.0.
    ///
    /// Used to scale coverage credit by relative volume.
    pub fn peak_calls<'a>(&self, dates: impl IntoIterator<Item = &'a NaiveDate>) -> f64 {
        dates
            .into_iter()
            .filter_map(|d| self.day(*d))
            .map(DayDemand::peak_calls)
            .fold(1.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rounds_up() {
        assert_eq!(RequirementSlot::new(10.0, 180.0, 0.0).required_agents(), 0);
        assert_eq!(RequirementSlot::new(10.0, 180.0, 2.1).required_agents(), 3);
        assert_eq!(RequirementSlot::new(10.0, 180.0, 3.0).required_agents(), 3);
    }

    #[test]
    fn test_missing_slots_read_empty() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let fc = DemandForecast::new().with_day(date, DayDemand::new(vec![RequirementSlot::new(5.0, 200.0, 1.0)]));
        assert_eq!(fc.slot(date, 0).calls, 5.0);
        assert_eq!(fc.slot(date, 10), RequirementSlot::default());
        assert_eq!(fc.slot(date.succ_opt().unwrap(), 0), RequirementSlot::default());
    }

    #[test]
    fn test_peak_calls_floor() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let fc = DemandForecast::new().with_day(date, DayDemand::flat(0.2, 180.0, 0.0));
        assert_eq!(fc.peak_calls([date].iter()), 1.0);

        let fc = fc.with_day(date, DayDemand::flat(12.0, 180.0, 1.0));
        assert_eq!(fc.peak_calls([date].iter()), 12.0);
    }
}
