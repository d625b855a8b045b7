//! Rostering domain models.
//!
//! Provides the data types shared by every stage of a rostering run:
//! who can work (agents, contracts, availability), what has to be
//! covered (forecast demand), what may be assigned (shift candidates) and
//! what was assigned (the schedule).
//!
//! # Domain Mappings
//!
//! | u-roster | Contact center | Retail | Healthcare |
//! |----------|----------------|--------|------------|
//! | Agent | Agent | Shop assistant | Nurse |
//! | RequirementSlot | Interval forecast | Footfall bucket | Census bucket |
//! | ShiftCandidate | Shift pattern | Shift pattern | Duty |
//! | Schedule | Roster | Rota | Duty roster |

mod agent;
mod calendar;
mod demand;
mod schedule;
mod shift;

pub use agent::{Absence, AbsenceKind, Agent, Contract, ShiftPreference};
pub use calendar::{format_clock, parse_clock, DayWindow, TimeWindow, WeeklyAvailability, MINUTES_PER_DAY};
pub use demand::{DayDemand, DemandForecast, RequirementSlot, SLOTS_PER_DAY, SLOT_MINUTES};
pub use schedule::{
    horizon_dates, Activity, ActivityKind, AgentSchedule, Schedule, ScheduleEntry, Violation, ViolationType, WorkShift,
};
pub use shift::ShiftCandidate;
