//! Queueing-theory staffing.
//!
//! Converts forecast contact volume into the number of agents needed to
//! meet a service target.
//!
//! # Formulas
//!
//! | Quantity | Definition |
//! |----------|-----------|
//! | Traffic A | calls per hour × AHT / 3600 (Erlangs) |
//! | Erlang B(N, A) | B₀ = 1, Bₖ = A·Bₖ₋₁ / (k + A·Bₖ₋₁) |
//! | Erlang C(N, A) | B / (1 − (A/N)(1 − B)); 1 when N ≤ A |
//! | Service level | 1 − C · exp(−(N − A) · t / AHT) |
//!
//! Service level is non-decreasing in N, so the minimum agent count for a
//! target is found by binary search.
//!
//! # Reference
//! Gans, Koole & Mandelbaum (2003), "Telephone Call Centers: Tutorial,
//! Review, and Research Prospects", M&SOM 5(2)

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};
use crate::models::{DemandForecast, RequirementSlot};

/// Upper bound for the agent search.
const MAX_AGENTS: u32 = 100_000;

/// Bucket `required` values at or below this are treated as missing.
pub const STALE_REQUIRED: f64 = 0.1;

fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RosterError::invalid(name, value, "must be a finite, non-negative number"))
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RosterError::invalid(name, value, "must be a finite, positive number"))
    }
}

/// Erlang B blocking probability for `servers` servers offered `intensity`
/// Erlangs. Fractional server counts are truncated.
///
/// # Examples
/// ```
/// use u_roster::staffing::erlang_b;
/// assert_eq!(erlang_b(0.0, 3.0).unwrap(), 1.0);
/// assert!((erlang_b(10.0, 5.0).unwrap() - 0.018385).abs() < 1e-6);
/// ```
pub fn erlang_b(servers: f64, intensity: f64) -> Result<f64> {
    check_non_negative("servers", servers)?;
    check_non_negative("intensity", intensity)?;
    if servers > f64::from(MAX_AGENTS) {
        return Err(RosterError::invalid("servers", servers, "exceeds the supported agent count"));
    }

    let mut b = 1.0;
    for k in 1..=(servers.floor() as u64) {
        b = intensity * b / (k as f64 + intensity * b);
    }
    Ok(b.clamp(0.0, 1.0))
}

/// Erlang C probability that a contact waits.
///
/// Returns 1.0 when `servers <= intensity` (unstable queue).
pub fn erlang_c(servers: f64, intensity: f64) -> Result<f64> {
    check_non_negative("servers", servers)?;
    check_non_negative("intensity", intensity)?;
    if servers <= intensity {
        return Ok(1.0);
    }

    let b = erlang_b(servers, intensity)?;
    let denominator = 1.0 - (intensity / servers) * (1.0 - b);
    if denominator <= 0.0 {
        return Ok(1.0);
    }
    Ok((b / denominator).clamp(0.0, 1.0))
}

/// Fraction of contacts answered within `answer_seconds`.
///
/// # Errors
/// `agents <= 0`, `aht <= 0`, or negative volume / answer time.
pub fn service_level(agents: f64, answer_seconds: f64, calls_per_hour: f64, aht: f64) -> Result<f64> {
    check_positive("agents", agents)?;
    check_positive("aht", aht)?;
    check_non_negative("calls_per_hour", calls_per_hour)?;
    check_non_negative("answer_seconds", answer_seconds)?;

    if calls_per_hour == 0.0 {
        return Ok(1.0);
    }
    let traffic = calls_per_hour * aht / 3600.0;
    if traffic >= agents {
        return Ok(0.0);
    }

    let c = erlang_c(agents, traffic)?;
    let waiting = c * ((traffic - agents) * answer_seconds / aht).exp();
    Ok((1.0 - waiting).clamp(0.0, 1.0))
}

/// How a staffing target is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetMode {
    /// Erlang C service level within the answer time.
    #[default]
    ServiceLevel,
    /// Linear attainable-volume ratio (attendance / NDA).
    Attendance,
}

/// Minimum agents for one half-hour bucket.
///
/// `calls` is the bucket volume (per 30 minutes). Service-level targets
/// return a whole agent count; attendance targets return `traffic / target`.
/// Empty buckets need no one.
///
/// # Examples
/// ```
/// use u_roster::staffing::{required_agents, TargetMode};
/// // 50 calls per half hour at 180s AHT is 5 Erlangs
/// let n = required_agents(50.0, 180.0, 0.8, 20.0, TargetMode::ServiceLevel).unwrap();
/// assert_eq!(n, 8.0);
/// ```
pub fn required_agents(calls: f64, aht: f64, target: f64, answer_seconds: f64, mode: TargetMode) -> Result<f64> {
    if !(0.0..=1.0).contains(&target) {
        return Err(RosterError::invalid("target", target, "must lie in [0, 1]"));
    }
    check_non_negative("answer_seconds", answer_seconds)?;
    if calls.is_nan() || aht.is_nan() || calls <= 0.0 || aht <= 0.0 {
        return Ok(0.0);
    }

    let calls_per_hour = calls * 2.0;
    let traffic = calls_per_hour * aht / 3600.0;

    if mode == TargetMode::Attendance {
        return Ok(if target <= 0.0 { traffic } else { traffic / target });
    }

    let meets = |n: u32| -> Result<bool> { Ok(service_level(f64::from(n), answer_seconds, calls_per_hour, aht)? >= target) };

    let floor = (traffic.floor() as u32).min(MAX_AGENTS);
    let mut low = floor.max(1);
    let mut high = ((traffic * 3.0).floor() as u32).max(floor.saturating_add(50)).min(MAX_AGENTS);

    while !meets(high)? {
        if high >= MAX_AGENTS {
            return Ok(f64::from(MAX_AGENTS));
        }
        low = high + 1;
        high = high.saturating_mul(2).min(MAX_AGENTS);
    }

    let mut best = high;
    while low <= high {
        let mid = low + (high - low) / 2;
        if meets(mid)? {
            best = mid;
            high = mid - 1;
        } else {
            low = mid + 1;
        }
    }
    Ok(f64::from(best))
}

/// A service target: level, answer time and measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceTarget {
    /// Target fraction (0..=1).
    pub level: f64,
    /// Answer-time threshold (seconds).
    pub answer_seconds: f64,
    /// How the target is measured.
    pub mode: TargetMode,
}

impl Default for ServiceTarget {
    fn default() -> Self {
        Self {
            level: 0.8,
            answer_seconds: 20.0,
            mode: TargetMode::ServiceLevel,
        }
    }
}

impl ServiceTarget {
    /// Creates a service-level target.
    pub fn service_level(level: f64, answer_seconds: f64) -> Self {
        Self {
            level,
            answer_seconds,
            mode: TargetMode::ServiceLevel,
        }
    }

    /// Creates an attendance target.
    pub fn attendance(level: f64) -> Self {
        Self {
            level,
            answer_seconds: 20.0,
            mode: TargetMode::Attendance,
        }
    }
}

/// Staffing calculator bound to one service target.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaffingCalculator {
    target: ServiceTarget,
}

impl StaffingCalculator {
    /// Creates a calculator for a target.
    pub fn new(target: ServiceTarget) -> Self {
        Self { target }
    }

    /// The bound target.
    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }

    /// Required agents for a half-hour volume.
    pub fn required(&self, calls: f64, aht: f64) -> Result<f64> {
        required_agents(calls, aht, self.target.level, self.target.answer_seconds, self.target.mode)
    }

    /// Service level `agents` reach for an hourly volume.
    pub fn service_level(&self, agents: f64, calls_per_hour: f64, aht: f64) -> Result<f64> {
        service_level(agents, self.target.answer_seconds, calls_per_hour, aht)
    }

    /// Recomputes `required` for buckets where it is missing.
    ///
    /// Returns the number of buckets updated.
    pub fn fill_missing(&self, demand: &mut DemandForecast) -> Result<usize> {
        let mut updated = 0;
        for day in demand.days.values_mut() {
            for slot in day.slots.iter_mut() {
                if needs_recompute(slot) {
                    slot.required = self.required(slot.calls, slot.aht)?;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }
}

/// Whether a bucket has volume but no usable required-agent count.
pub fn needs_recompute(slot: &RequirementSlot) -> bool {
    slot.required <= STALE_REQUIRED && slot.calls > 0.0
}

// ======================== Shrinkage ========================

/// Staffing reducers, as fractions of scheduled time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shrinkage {
    /// Logged-in time spent on auxiliary (non-contact) work.
    pub auxiliary: f64,
    /// Scheduled agents who do not show up.
    pub absenteeism: f64,
    /// Present agents who are not logged in.
    pub shrinkage: f64,
}

/// Headcount at each stage of the shrinkage cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaffingCascade {
    /// Agents handling contacts.
    pub effective: f64,
    /// Agents logged in.
    pub logged: f64,
    /// Agents present.
    pub present: f64,
    /// Agents to schedule.
    pub dimensioned: f64,
}

impl Shrinkage {
    /// Creates a set of reducers.
    pub fn new(auxiliary: f64, absenteeism: f64, shrinkage: f64) -> Self {
        Self {
            auxiliary,
            absenteeism,
            shrinkage,
        }
    }

    /// Grosses effective agents up through each reducer in turn.
    ///
    /// Fractions are clamped to [0, 1]; a reducer of exactly 1 is skipped.
    pub fn cascade(&self, effective: f64) -> StaffingCascade {
        fn gross(value: f64, fraction: f64) -> f64 {
            let keep = 1.0 - fraction.clamp(0.0, 1.0);
            if keep > 0.0 {
                value / keep
            } else {
                value
            }
        }

        let logged = gross(effective, self.auxiliary);
        let present = gross(logged, self.absenteeism);
        let dimensioned = gross(present, self.shrinkage);
        StaffingCascade {
            effective,
            logged,
            present,
            dimensioned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayDemand;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    #[test]
    fn test_huge_server_count_rejected() {
        assert!(erlang_b(1e12, 5.0).is_err());
        assert!(erlang_c(1e12, 5.0).is_err());
        assert!(service_level(1e12, 20.0, 100.0, 180.0).is_err());
        assert!(erlang_b(f64::from(MAX_AGENTS), 5.0).is_ok());
    }

    #[test]
    fn test_erlang_b_reference() {
        let b = erlang_b(10.0, 5.0).unwrap();
        assert!((b - 0.018385).abs() < 1e-6);
        assert_eq!(erlang_b(0.0, 2.5).unwrap(), 1.0);
        assert_eq!(erlang_b(3.0, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_erlang_c_reference() {
        let c = erlang_c(10.0, 5.0).unwrap();
        assert!((c - 0.036105).abs() < 1e-5);
        assert_eq!(erlang_c(5.0, 5.0).unwrap(), 1.0);
        assert_eq!(erlang_c(4.0, 6.0).unwrap(), 1.0);
    }

    #[test]
    fn test_service_level_reference() {
        // 10 agents, 20s, 100 calls/h, 180s AHT
        let sl = service_level(10.0, 20.0, 100.0, 180.0).unwrap();
        assert!((sl - 0.9793).abs() < 5e-5);
        assert!((sl - 0.979_284_426_675_960_2).abs() < 1e-9);
    }

    #[test]
    fn test_service_level_edges() {
        assert_eq!(service_level(3.0, 20.0, 0.0, 180.0).unwrap(), 1.0);
        assert_eq!(service_level(5.0, 20.0, 100.0, 180.0).unwrap(), 0.0); // A = N
        assert!(service_level(0.0, 20.0, 100.0, 180.0).is_err());
        assert!(service_level(5.0, 20.0, 100.0, 0.0).is_err());
        assert!(service_level(5.0, 20.0, -1.0, 180.0).is_err());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(erlang_b(-1.0, 2.0).is_err());
        assert!(erlang_c(2.0, -0.5).is_err());
        assert!(erlang_b(f64::NAN, 2.0).is_err());
        let err = required_agents(10.0, 180.0, 1.5, 20.0, TargetMode::ServiceLevel).unwrap_err();
        assert!(matches!(err, RosterError::InvalidArgument { name: "target", .. }));
    }

    #[test]
    fn test_required_agents_service_level() {
        let n = required_agents(50.0, 180.0, 0.8, 20.0, TargetMode::ServiceLevel).unwrap();
        assert_eq!(n, 8.0);
        // N must meet the target and N-1 must not
        assert!(service_level(n, 20.0, 100.0, 180.0).unwrap() >= 0.8);
        assert!(service_level(n - 1.0, 20.0, 100.0, 180.0).unwrap() < 0.8);
    }

    #[test]
    fn test_required_agents_empty_bucket() {
        assert_eq!(required_agents(0.0, 180.0, 0.8, 20.0, TargetMode::ServiceLevel).unwrap(), 0.0);
        assert_eq!(required_agents(10.0, 0.0, 0.8, 20.0, TargetMode::ServiceLevel).unwrap(), 0.0);
        assert_eq!(required_agents(-3.0, 180.0, 0.8, 20.0, TargetMode::Attendance).unwrap(), 0.0);
    }

    #[test]
    fn test_required_agents_small_volume() {
        // one call per half hour still needs an agent
        let n = required_agents(1.0, 180.0, 0.8, 20.0, TargetMode::ServiceLevel).unwrap();
        assert_eq!(n, 1.0);
    }

    #[test]
    fn test_required_agents_attendance() {
        // traffic = 100 * 180 / 3600 = 5
        let n = required_agents(50.0, 180.0, 0.8, 20.0, TargetMode::Attendance).unwrap();
        assert!((n - 6.25).abs() < 1e-10);
        let n0 = required_agents(50.0, 180.0, 0.0, 20.0, TargetMode::Attendance).unwrap();
        assert!((n0 - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_fill_missing() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let mut slots = vec![RequirementSlot::new(50.0, 180.0, 0.0); 48];
        slots[0] = RequirementSlot::new(0.0, 180.0, 0.0);
        slots[1] = RequirementSlot::new(50.0, 180.0, 4.0);
        let mut fc = DemandForecast::new().with_day(date, DayDemand::new(slots));

        let calc = StaffingCalculator::new(ServiceTarget::default());
        let updated = calc.fill_missing(&mut fc).unwrap();
        assert_eq!(updated, 46);
        assert_eq!(fc.slot(date, 0).required, 0.0);
        assert_eq!(fc.slot(date, 1).required, 4.0); // kept
        assert_eq!(fc.slot(date, 2).required, 8.0);
    }

    #[test]
    fn test_shrinkage_cascade() {
        let s = Shrinkage::new(0.2, 0.2, 0.5);
        let c = s.cascade(8.0);
        assert!((c.logged - 10.0).abs() < 1e-10);
        assert!((c.present - 12.5).abs() < 1e-10);
        assert!((c.dimensioned - 25.0).abs() < 1e-10);

        let full = Shrinkage::new(1.0, 0.0, 3.0).cascade(4.0);
        assert!((full.dimensioned - 4.0).abs() < 1e-10);
    }

    proptest! {
        #[test]
        fn prop_oversized_servers_rejected(extra in 1.0f64..1e15, intensity in 0.0f64..1e6) {
            prop_assert!(erlang_b(f64::from(MAX_AGENTS) + extra, intensity).is_err());
        }

        #[test]
        fn prop_probabilities_bounded(servers in 0u32..80, intensity in 0.0f64..80.0) {
            let n = f64::from(servers);
            let b = erlang_b(n, intensity).unwrap();
            prop_assert!((0.0..=1.0).contains(&b));
            let c = erlang_c(n, intensity).unwrap();
            prop_assert!((0.0..=1.0).contains(&c));
            if servers > 0 && intensity > 0.0 {
                prop_assert!(c >= b - 1e-12);
            }
        }

        #[test]
        fn prop_required_monotone_in_target(
            calls in 0.5f64..400.0,
            aht in 30.0f64..600.0,
            t1 in 0.0f64..1.0,
            t2 in 0.0f64..1.0,
        ) {
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            let a = required_agents(calls, aht, lo, 20.0, TargetMode::ServiceLevel).unwrap();
            let b = required_agents(calls, aht, hi, 20.0, TargetMode::ServiceLevel).unwrap();
            prop_assert!(a <= b);
        }

        #[test]
        fn prop_required_monotone_in_calls(
            c1 in 0.0f64..400.0,
            c2 in 0.0f64..400.0,
            aht in 30.0f64..600.0,
            target in 0.0f64..0.99,
        ) {
            let (lo, hi) = if c1 <= c2 { (c1, c2) } else { (c2, c1) };
            for mode in [TargetMode::ServiceLevel, TargetMode::Attendance] {
                let a = required_agents(lo, aht, target, 20.0, mode).unwrap();
                let b = required_agents(hi, aht, target, 20.0, mode).unwrap();
                prop_assert!(a <= b + 1e-9);
            }
        }
    }
}
