//! Shift assignment engines and their isolation.
//!
//! # Engines
//!
//! The constraint solver ([`crate::cp::RosterCpBuilder`]) is exact within
//! its time budget. [`GreedyScheduler`] is linear in agents × days ×
//! candidates and never fails. [`SchedulerFacade`] picks between them and
//! always returns a complete schedule.
//!
//! # Isolation
//!
//! A run is a serializable [`ScheduleJob`] executed by a [`BoundedWorker`]
//! under a wall-clock limit, either on a thread ([`ThreadWorker`]) or in a
//! `roster-worker` child process ([`ProcessWorker`]).
//!
//! # References
//!
//! - Ernst et al. (2004), "Staff scheduling and rostering: A review of applications, methods and models"
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 13

mod facade;
mod greedy;
mod worker;

pub use facade::{Engine, RosterOutcome, ScheduleJob, SchedulerFacade};
pub use greedy::GreedyScheduler;
pub use worker::{BoundedWorker, ProcessWorker, ThreadWorker};
