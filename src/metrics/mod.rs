//! Coverage metrics of a produced schedule.
//!
//! Recomputes, at a fine resolution, how many agents are actually
//! available per slot and what that means for service.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | agents | Σ shift overlap − Σ break/PVD overlap, in agent-slots |
//! | demand | half-hour calls / (30 / interval) |
//! | coverage_pct | Erlang C service level × 100 at `demand × 60 / interval` calls per hour |
//! | attainable | min(agents × interval × 60 / AHT, demand) |
//! | nda_pct | attainable / demand × 100 (100 without demand) |
//! | at risk | coverage_pct < target × 100 × `at_risk_ratio` |
//!
//! Work that runs past midnight counts toward the next date. Every date
//! of the schedule is reported, worked or not.
//!
//! # Reference
//! Koole (2013), "Call Center Optimization", Ch. 4: Workforce Management

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RosterError};
use crate::models::{ActivityKind, DemandForecast, Schedule, ScheduleEntry, MINUTES_PER_DAY, SLOT_MINUTES};
use crate::staffing::{needs_recompute, ServiceTarget, StaffingCalculator};

/// AHT assumed for buckets without one (seconds).
const DEFAULT_AHT: f64 = 300.0;

/// Metrics settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Slot width (minutes). Must divide 30.
    pub interval_minutes: u32,
    /// Fraction of the target below which a slot is at risk.
    pub at_risk_ratio: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            at_risk_ratio: 0.5,
        }
    }
}

/// Metrics of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotMetrics {
    /// Slot index within the day.
    pub slot: usize,
    /// Available agents.
    pub agents: f64,
    /// Agents on a rest break.
    pub breaks: f64,
    /// Agents on a PVD.
    pub pvds: f64,
    /// Required agents of the half-hour bucket.
    pub required: f64,
    /// Contacts arriving in the slot.
    pub demand: f64,
    /// Contacts the available agents can handle.
    pub attainable: f64,
    /// Service level (%).
    pub coverage_pct: f64,
    /// Attendance (%).
    pub nda_pct: f64,
    /// Service level far below target.
    #[serde(rename = "susceptible")]
    pub at_risk: bool,
}

/// Metrics of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayMetrics {
    /// One entry per slot.
    pub slots: Vec<SlotMetrics>,
    /// Indices of at-risk slots.
    #[serde(rename = "susceptible_slots")]
    pub at_risk_slots: Vec<usize>,
}

/// Metrics of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    /// Scheduled hours over all agents.
    pub total_hours: f64,
    /// Agents in the schedule.
    pub total_agents_scheduled: usize,
    /// Agents with at least one worked day.
    pub active_agents: usize,
    /// Calls-weighted AHT of the demand over the horizon (seconds).
    pub average_handle_time: f64,
    /// Absence days per code.
    pub absences: BTreeMap<String, usize>,
    /// Slot width (minutes).
    pub interval_minutes: u32,
    /// Per-date metrics.
    pub daily_metrics: BTreeMap<NaiveDate, DayMetrics>,
}

impl ScheduleMetrics {
    /// Number of at-risk slots over the horizon.
    pub fn at_risk_count(&self) -> usize {
        self.daily_metrics.values().map(|d| d.at_risk_slots.len()).sum()
    }
}

/// Per-date slot accumulators.
struct Load {
    agents: Vec<f64>,
    breaks: Vec<f64>,
    pvds: Vec<f64>,
}

impl Load {
    fn new(slots: usize) -> Self {
        Self {
            agents: vec![0.0; slots],
            breaks: vec![0.0; slots],
            pvds: vec![0.0; slots],
        }
    }
}

/// Computes [`ScheduleMetrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCalculator {
    target: ServiceTarget,
    config: MetricsConfig,
}

impl MetricsCalculator {
    /// Creates a calculator.
    pub fn new(target: ServiceTarget, config: MetricsConfig) -> Self {
        Self { target, config }
    }

    /// Computes metrics for `schedule` against `demand`.
    ///
    /// # Errors
    /// An interval that does not divide 30 minutes, or an invalid target.
    pub fn calculate(&self, schedule: &Schedule, demand: &DemandForecast) -> Result<ScheduleMetrics> {
        let interval = self.config.interval_minutes as i32;
        if interval <= 0 || SLOT_MINUTES % interval != 0 {
            return Err(RosterError::invalid(
                "interval_minutes",
                f64::from(self.config.interval_minutes),
                "must divide 30",
            ));
        }
        let slots = (MINUTES_PER_DAY / interval) as usize;

        let mut loads: BTreeMap<NaiveDate, Load> = schedule.dates().map(|d| (d, Load::new(slots))).collect();
        let mut total_minutes: i64 = 0;
        let mut active_agents = 0;
        let mut absences: BTreeMap<String, usize> = BTreeMap::new();

        for row in &schedule.agents {
            let mut worked = false;
            for (date, entry) in &row.entries {
                match entry {
                    ScheduleEntry::Work(shift) => {
                        worked = true;
                        total_minutes += i64::from(shift.duration_minutes);
                        for seg in &shift.segments {
                            spread(&mut loads, *date, seg.start_min, seg.end_min, interval, |l| &mut l.agents, 1.0);
                        }
                        for act in &shift.activities {
                            spread(&mut loads, *date, act.start, act.end, interval, |l| &mut l.agents, -1.0);
                            match act.kind {
                                ActivityKind::Break => {
                                    spread(&mut loads, *date, act.start, act.end, interval, |l| &mut l.breaks, 1.0)
                                }
                                ActivityKind::Pvd => {
                                    spread(&mut loads, *date, act.start, act.end, interval, |l| &mut l.pvds, 1.0)
                                }
                            }
                        }
                    }
                    ScheduleEntry::Absence { kind, .. } => {
                        *absences.entry(kind.code().to_string()).or_insert(0) += 1;
                    }
                    ScheduleEntry::Off => {}
                }
            }
            if worked {
                active_agents += 1;
            }
        }

        let staffing = StaffingCalculator::new(self.target);
        let mut daily_metrics = BTreeMap::new();
        for (date, load) in &loads {
            daily_metrics.insert(*date, self.day_metrics(&staffing, demand, *date, load, interval)?);
        }

        let metrics = ScheduleMetrics {
            total_hours: total_minutes as f64 / 60.0,
            total_agents_scheduled: schedule.agents.len(),
            active_agents,
            average_handle_time: weighted_aht(demand, schedule),
            absences,
            interval_minutes: self.config.interval_minutes,
            daily_metrics,
        };
        debug!(
            hours = metrics.total_hours,
            at_risk = metrics.at_risk_count(),
            "schedule metrics computed"
        );
        Ok(metrics)
    }

    fn day_metrics(
        &self,
        staffing: &StaffingCalculator,
        demand: &DemandForecast,
        date: NaiveDate,
        load: &Load,
        interval: i32,
    ) -> Result<DayMetrics> {
        let per_bucket = f64::from(SLOT_MINUTES / interval);
        let mut slots = Vec::with_capacity(load.agents.len());
        let mut at_risk_slots = Vec::new();

        for i in 0..load.agents.len() {
            let bucket = demand.slot(date, i * interval as usize / SLOT_MINUTES as usize);
            let calls = bucket.calls / per_bucket;
            let aht = if bucket.aht > 0.0 { bucket.aht } else { DEFAULT_AHT };
            let required = if needs_recompute(&bucket) {
                staffing.required(bucket.calls, aht)?
            } else {
                bucket.required
            };

            let agents = load.agents[i].max(0.0);
            let sl_pct = if agents <= 0.0 {
                if calls > 0.0 {
                    0.0
                } else {
                    100.0
                }
            } else {
                staffing.service_level(agents, calls * 60.0 / f64::from(interval), aht)? * 100.0
            };

            let capacity = agents * f64::from(interval) * 60.0 / aht;
            let attainable = if calls > 0.0 { capacity.min(calls) } else { 0.0 };
            let nda_pct = if calls > 0.0 { attainable / calls * 100.0 } else { 100.0 };

            let at_risk = sl_pct < self.target.level * 100.0 * self.config.at_risk_ratio;
            if at_risk {
                at_risk_slots.push(i);
            }
            slots.push(SlotMetrics {
                slot: i,
                agents: round3(agents),
                breaks: round3(load.breaks[i]),
                pvds: round3(load.pvds[i]),
                required,
                demand: round3(calls),
                attainable: round3(attainable),
                coverage_pct: sl_pct,
                nda_pct,
                at_risk,
            });
        }
        Ok(DayMetrics { slots, at_risk_slots })
    }
}

/// Adds `weight × overlap / interval` to every slot `[start, end)` touches,
/// carrying minutes past midnight into the following dates.
fn spread(
    loads: &mut BTreeMap<NaiveDate, Load>,
    date: NaiveDate,
    start: i32,
    end: i32,
    interval: i32,
    field: fn(&mut Load) -> &mut Vec<f64>,
    weight: f64,
) {
    let mut from = start.max(0);
    while from < end {
        let offset = from.div_euclid(MINUTES_PER_DAY);
        let base = offset * MINUTES_PER_DAY;
        let (lo, hi) = (from - base, (end - base).min(MINUTES_PER_DAY));
        if let Some(load) = loads.get_mut(&(date + Duration::days(i64::from(offset)))) {
            let values = field(load);
            let mut slot = (lo / interval) as usize;
            while slot < values.len() && (slot as i32) * interval < hi {
                let s = slot as i32 * interval;
                let overlap = (hi.min(s + interval) - lo.max(s)).max(0);
                values[slot] += weight * f64::from(overlap) / f64::from(interval);
                slot += 1;
            }
        }
        from = base + MINUTES_PER_DAY;
    }
}

fn weighted_aht(demand: &DemandForecast, schedule: &Schedule) -> f64 {
    let (mut calls, mut weighted) = (0.0, 0.0);
    for date in schedule.dates() {
        if let Some(day) = demand.day(date) {
            for slot in day.slots.iter().filter(|s| s.calls > 0.0 && s.aht > 0.0) {
                calls += slot.calls;
                weighted += slot.calls * slot.aht;
            }
        }
    }
    if calls > 0.0 {
        weighted / calls
    } else {
        0.0
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::ActivityAllocator;
    use crate::models::{AbsenceKind, AgentSchedule, DayDemand, RequirementSlot, ShiftCandidate};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn schedule(shifts: &[(&str, i32, i32)]) -> Schedule {
        let mut s = Schedule::new(date(), 1);
        for (id, start, end) in shifts {
            let mut row = AgentSchedule::new(*id);
            row.set(date(), ScheduleEntry::from(&ShiftCandidate::continuous(*start, *end)));
            s.add_agent(row);
        }
        s
    }

    fn flat(calls: f64) -> DemandForecast {
        DemandForecast::new().with_day(date(), DayDemand::flat(calls, 180.0, 1.0))
    }

    #[test]
    fn test_two_agents_service_level() {
        let s = schedule(&[("A", 480, 960), ("B", 480, 960)]);
        let m = MetricsCalculator::default().calculate(&s, &flat(10.0)).unwrap();
        let day = &m.daily_metrics[&date()];
        assert_eq!(day.slots.len(), 288);

        // 08:00: 2 agents, 20 calls/h at 180s
        let slot = &day.slots[96];
        assert_eq!(slot.agents, 2.0);
        assert_eq!(slot.demand, 1.667);
        assert!((slot.coverage_pct - 70.172).abs() < 1e-3);
        assert!((slot.nda_pct - 100.0).abs() < 1e-9);
        assert!(!slot.at_risk);

        // nobody at night
        assert!(day.slots[0].at_risk);
        assert_eq!(day.slots[0].coverage_pct, 0.0);
        assert_eq!(m.total_hours, 16.0);
        assert_eq!(m.active_agents, 2);
        assert!((m.average_handle_time - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_activities_reduce_coverage() {
        let mut s = schedule(&[("A", 480, 960)]);
        ActivityAllocator::default().allocate(&mut s);
        let m = MetricsCalculator::default().calculate(&s, &flat(10.0)).unwrap();
        let day = &m.daily_metrics[&date()];
        // PVD at 08:55, break at 11:05
        assert_eq!(day.slots[107].agents, 0.0);
        assert_eq!(day.slots[107].pvds, 1.0);
        assert_eq!(day.slots[133].breaks, 1.0);
        assert_eq!(day.slots[133].agents, 0.0);
        assert_eq!(day.slots[106].agents, 1.0);
    }

    #[test]
    fn test_empty_demand_and_recompute() {
        let s = schedule(&[("A", 480, 960)]);
        let m = MetricsCalculator::default().calculate(&s, &DemandForecast::new()).unwrap();
        let slot = &m.daily_metrics[&date()].slots[0];
        assert_eq!(slot.coverage_pct, 100.0);
        assert_eq!(slot.nda_pct, 100.0);
        assert_eq!(m.at_risk_count(), 0);

        // stale requirement is recomputed from volume: 50 calls at 180s need 8
        let demand = DemandForecast::new().with_day(date(), DayDemand::flat(50.0, 180.0, 0.0));
        let m = MetricsCalculator::default().calculate(&s, &demand).unwrap();
        assert_eq!(m.daily_metrics[&date()].slots[0].required, 8.0);
    }

    #[test]
    fn test_overnight_spills_into_next_day() {
        let mut s = Schedule::new(date(), 2);
        let mut row = AgentSchedule::new("A");
        row.set(date(), ScheduleEntry::from(&ShiftCandidate::continuous(1320, 1800)));
        row.set(date() + Duration::days(1), ScheduleEntry::absence(AbsenceKind::Vacation, ""));
        s.add_agent(row);

        let m = MetricsCalculator::default().calculate(&s, &DemandForecast::new()).unwrap();
        assert_eq!(m.daily_metrics[&date()].slots[287].agents, 1.0);
        let next = &m.daily_metrics[&(date() + Duration::days(1))];
        assert_eq!(next.slots[0].agents, 1.0);
        assert_eq!(next.slots[71].agents, 1.0);
        assert_eq!(next.slots[72].agents, 0.0);
        assert_eq!(m.absences["VAC"], 1);
    }

    #[test]
    fn test_partial_slot_overlap() {
        let s = schedule(&[("A", 482, 960)]);
        let m = MetricsCalculator::new(ServiceTarget::default(), MetricsConfig::default())
            .calculate(&s, &DemandForecast::new())
            .unwrap();
        assert_eq!(m.daily_metrics[&date()].slots[96].agents, 0.6);
    }

    #[test]
    fn test_bad_interval() {
        let calc = MetricsCalculator::new(
            ServiceTarget::default(),
            MetricsConfig {
                interval_minutes: 7,
                at_risk_ratio: 0.5,
            },
        );
        assert!(calc.calculate(&schedule(&[]), &DemandForecast::new()).is_err());
    }

    #[test]
    fn test_idempotent() {
        let mut s = schedule(&[("A", 480, 960), ("B", 600, 1080)]);
        ActivityAllocator::default().allocate(&mut s);
        let demand = DemandForecast::new().with_day(
            date(),
            DayDemand::new((0..48).map(|i| RequirementSlot::new(f64::from(i), 200.0, 0.0)).collect()),
        );
        let calc = MetricsCalculator::default();
        let first = calc.calculate(&s, &demand).unwrap();
        let second = calc.calculate(&s, &demand).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
