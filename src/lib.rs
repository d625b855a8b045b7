//! Contact-center workforce rostering.
//!
//! Turns a half-hour demand forecast and a roster of agents (contracts,
//! availability, absences) into a day-by-day shift schedule with breaks,
//! and reports how well that schedule covers the demand.
//!
//! # Modules
//!
//! - **`staffing`**: Erlang B/C, service level, required agents, shrinkage
//! - **`models`**: Domain types: `Agent`, `Contract`, `DayWindow`,
//!   `ShiftCandidate`, `DemandForecast`, `Schedule`, `Violation`
//! - **`rules`**: Per-country working-time policy and the rest rule
//! - **`catalog`**: Shift candidates per agent and date
//! - **`cp`**: Boolean constraint model, its Pumpkin and in-memory backends and the roster formulation
//! - **`scheduler`**: Greedy engine, engine selection and bounded workers
//! - **`activities`**: Break and PVD placement inside worked shifts
//! - **`metrics`**: Per-slot coverage, service level and at-risk slots
//! - **`validation`**: Input integrity checks and schedule audit
//! - **`planner`**: The end-to-end pipeline
//! - **`config`**: JSON-loadable configuration of a run
//!
//! # Example
//!
//! ```
//! use chrono::{NaiveDate, Weekday};
//! use u_roster::models::{Agent, Contract, DayWindow, DemandForecast, WeeklyAvailability};
//! use u_roster::{PlanRequest, Planner};
//!
//! let agent = Agent::new("A1", "ES")
//!     .with_contract(Contract::weekly(40.0))
//!     .with_windows(WeeklyAvailability::new().with_days(
//!         &[Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
//!         DayWindow::continuous(480, 960),
//!     ));
//! let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
//! let request = PlanRequest::new(vec![agent], DemandForecast::new(), start, 7);
//!
//! let output = Planner::default().plan(request).unwrap();
//! assert_eq!(output.schedule.agent("A1").unwrap().worked_minutes(), 2400);
//! ```
//!
//! # References
//!
//! - Koole (2013), "Call Center Optimization"
//! - Ernst et al. (2004), "Staff scheduling and rostering: A review of applications, methods and models"
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"

pub mod activities;
pub mod catalog;
pub mod config;
pub mod cp;
pub mod error;
pub mod metrics;
pub mod models;
pub mod planner;
pub mod rules;
pub mod scheduler;
pub mod staffing;
pub mod validation;

pub use config::PlannerConfig;
pub use error::{Result, RosterError};
pub use planner::{PlanOutput, PlanRequest, Planner};
