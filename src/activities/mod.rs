//! Break and PVD placement inside worked shifts.
//!
//! # Rest break
//! One break per shift, its length looked up from the rounded shift hours
//! (ties to even) in [`ActivityConfig::break_bands`]. The start lies in
//! `[start + 2h, min(start + 4.5h, end - 1h) - length]`, on a 5-minute grid.
//! No break is placed when that range is empty.
//!
//! # PVDs
//! One 5-minute PVD per rounded hour, capped. The first starts 45-65
//! minutes into the shift, each next one 50-65 minutes after the previous,
//! floored to the 5-minute grid. A PVD hitting the break moves to 10
//! minutes after it. Placement stops at the first PVD that would not end
//! before the shift does.
//!
//! # Placement
//! [`Placement::Midpoint`] takes the middle of every range, which makes
//! the result a pure function of the shift. [`Placement::Seeded`] draws
//! uniformly from a seeded generator, walking the schedule in agent then
//! date order.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Activity, ActivityKind, Schedule, WorkShift};

const GRID_MINUTES: i32 = 5;
const BREAK_OFFSET: (i32, i32) = (120, 270);
const BREAK_END_MARGIN: i32 = 60;
const FIRST_PVD_OFFSET: (i32, i32) = (45, 65);
const PVD_SPACING: (i32, i32) = (50, 65);
const PVD_AFTER_BREAK: i32 = 10;

/// Break length for a range of rounded shift hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakBand {
    /// Lowest rounded hours in the band.
    pub min_hours: u32,
    /// Highest rounded hours in the band (open-ended when `None`).
    pub max_hours: Option<u32>,
    /// Break length (minutes).
    pub minutes: i32,
}

impl BreakBand {
    fn contains(&self, hours: u32) -> bool {
        hours >= self.min_hours && self.max_hours.map_or(true, |m| hours <= m)
    }
}

/// How positions are chosen within their windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "seed", rename_all = "snake_case")]
pub enum Placement {
    /// Middle of each window.
    #[default]
    Midpoint,
    /// Uniform draws from a generator with this seed.
    Seeded(u64),
}

/// Allocator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Whether breaks and PVDs are generated at all.
    pub enabled: bool,
    /// Break length per rounded-hours band.
    pub break_bands: Vec<BreakBand>,
    /// PVD length (minutes).
    pub pvd_minutes: i32,
    /// Maximum PVDs per shift.
    pub max_pvds: usize,
    /// Position policy.
    pub placement: Placement,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            break_bands: vec![
                BreakBand {
                    min_hours: 4,
                    max_hours: Some(5),
                    minutes: 10,
                },
                BreakBand {
                    min_hours: 6,
                    max_hours: Some(8),
                    minutes: 20,
                },
                BreakBand {
                    min_hours: 9,
                    max_hours: None,
                    minutes: 30,
                },
            ],
            pvd_minutes: 5,
            max_pvds: 10,
            placement: Placement::Midpoint,
        }
    }
}

impl ActivityConfig {
    /// Disables generation.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the placement policy.
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Break length for a number of rounded hours (0 = no break).
    pub fn break_minutes(&self, rounded_hours: u32) -> i32 {
        self.break_bands
            .iter()
            .find(|b| b.contains(rounded_hours))
            .map_or(0, |b| b.minutes)
    }
}

enum Picker {
    Midpoint,
    Random(SmallRng),
}

impl Picker {
    /// A value in `[lo, hi]`.
    fn pick(&mut self, lo: i32, hi: i32) -> i32 {
        match self {
            Picker::Midpoint => lo + (hi - lo) / 2,
            Picker::Random(rng) => rng.random_range(lo..=hi),
        }
    }
}

/// Places breaks and PVDs on every worked shift of a schedule.
#[derive(Debug, Clone, Default)]
pub struct ActivityAllocator {
    config: ActivityConfig,
}

impl ActivityAllocator {
    /// Creates an allocator.
    pub fn new(config: ActivityConfig) -> Self {
        Self { config }
    }

    /// Replaces the activities of every worked shift not edited by hand.
    ///
    /// Returns the number of shifts updated.
    pub fn allocate(&self, schedule: &mut Schedule) -> usize {
        let mut picker = match self.config.placement {
            Placement::Midpoint => Picker::Midpoint,
            Placement::Seeded(seed) => Picker::Random(SmallRng::seed_from_u64(seed)),
        };

        let mut updated = 0;
        for row in &mut schedule.agents {
            for entry in row.entries.values_mut() {
                let Some(shift) = entry.as_work_mut() else {
                    continue;
                };
                if shift.manual_activities {
                    continue;
                }
                shift.activities = if self.config.enabled {
                    self.plan(shift, &mut picker)
                } else {
                    Vec::new()
                };
                updated += 1;
            }
        }
        debug!(shifts = updated, "activities allocated");
        updated
    }

    /// Activities for one shift, sorted by start.
    pub fn activities_for(&self, shift: &WorkShift) -> Vec<Activity> {
        self.plan(shift, &mut Picker::Midpoint)
    }

    fn plan(&self, shift: &WorkShift, picker: &mut Picker) -> Vec<Activity> {
        let rounded = (f64::from(shift.duration_minutes) / 60.0).round_ties_even().max(0.0) as u32;
        let mut activities = Vec::new();

        let rest = self.place_break(shift, rounded, picker);
        if let Some(b) = rest {
            activities.push(b);
        }

        let len = self.config.pvd_minutes;
        let mut cursor = shift.start_min + picker.pick(FIRST_PVD_OFFSET.0, FIRST_PVD_OFFSET.1);
        let mut placed = 0;
        for _ in 0..rounded {
            if placed >= self.config.max_pvds {
                break;
            }
            let mut start = floor_to_grid(cursor);
            if let Some(b) = rest {
                if start < b.end && start + len > b.start {
                    start = b.end + PVD_AFTER_BREAK;
                }
            }
            if start + len >= shift.end_min {
                break;
            }
            // split shifts: nothing in the gap
            if shift.encloses(start, start + len) {
                activities.push(Activity::new(ActivityKind::Pvd, start, start + len));
                placed += 1;
            }
            cursor = start + picker.pick(PVD_SPACING.0, PVD_SPACING.1);
        }

        activities.sort_by_key(|a| a.start);
        activities
    }

    fn place_break(&self, shift: &WorkShift, rounded: u32, picker: &mut Picker) -> Option<Activity> {
        let len = self.config.break_minutes(rounded);
        if len <= 0 {
            return None;
        }
        let lo = shift.start_min + BREAK_OFFSET.0;
        let hi = (shift.start_min + BREAK_OFFSET.1).min(shift.end_min - BREAK_END_MARGIN) - len;
        if hi < lo {
            debug!(shift = %shift.label, "no room for a break");
            return None;
        }
        let start = floor_to_grid(picker.pick(lo, hi)).max(floor_to_grid(lo + GRID_MINUTES - 1));
        if start > hi || !shift.encloses(start, start + len) {
            return None;
        }
        Some(Activity::new(ActivityKind::Break, start, start + len))
    }
}

fn floor_to_grid(minute: i32) -> i32 {
    minute.div_euclid(GRID_MINUTES) * GRID_MINUTES
}
