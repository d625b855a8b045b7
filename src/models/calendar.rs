//! Availability windows.
//!
//! Agents declare, per weekday, the time-of-day interval(s) in which they
//! may be scheduled. A day is either closed, one continuous window, or a
//! split window made of several segments (`09:00-14:00/15:00-18:00`).
//!
//! # Time Model
//! All times are minutes since the midnight that opens the scheduled date.
//! A segment whose end is not after its start runs overnight and its end
//! is stored past 1440.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};

/// Minutes in one day.
pub const MINUTES_PER_DAY: i32 = 1440;

/// A time interval [start, end) in minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// Interval start (minutes, inclusive).
    pub start_min: i32,
    /// Interval end (minutes, exclusive). May exceed 1440.
    pub end_min: i32,
}

impl TimeWindow {
    /// Creates a new time window.
    pub fn new(start_min: i32, end_min: i32) -> Self {
        Self { start_min, end_min }
    }

    /// Duration of this window in minutes.
    #[inline]
    pub fn duration_min(&self) -> i32 {
        self.end_min - self.start_min
    }

    /// Whether a minute falls within this window.
    #[inline]
    pub fn contains(&self, minute: i32) -> bool {
        minute >= self.start_min && minute < self.end_min
    }

    /// Whether `other` lies entirely inside this window.
    pub fn encloses(&self, other: &Self) -> bool {
        other.start_min >= self.start_min && other.end_min <= self.end_min
    }

    /// Whether two windows overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_min < other.end_min && other.start_min < self.end_min
    }

    /// Overlap length with `[start, end)` in minutes (0 if disjoint).
    pub fn overlap_with(&self, start_min: i32, end_min: i32) -> i32 {
        (self.end_min.min(end_min) - self.start_min.max(start_min)).max(0)
    }

    /// Parses `H:MM-H:MM`. An end not after the start is overnight.
    pub fn parse(input: &str) -> Result<Self> {
        let err = || RosterError::WindowParse {
            input: input.to_string(),
        };
        let (start, end) = input.split_once('-').ok_or_else(err)?;
        let start_min = parse_clock(start.trim()).ok_or_else(err)?;
        let mut end_min = parse_clock(end.trim()).ok_or_else(err)?;
        if start_min >= MINUTES_PER_DAY {
            return Err(err());
        }
        if end_min <= start_min {
            end_min += MINUTES_PER_DAY;
        }
        Ok(Self::new(start_min, end_min))
    }

    /// `HH:MM-HH:MM` label; ends past midnight wrap (`22:00-06:00`),
    /// an end of exactly 1440 prints as `24:00`.
    pub fn label(&self) -> String {
        format!("{}-{}", format_clock(self.start_min), format_end(self.end_min))
    }
}

/// Parses `H:MM` / `HH:MM` into minutes. Accepts `24:00`.
pub fn parse_clock(input: &str) -> Option<i32> {
    let (h, m) = input.split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if m >= 60 || h > 24 || (h == 24 && m != 0) {
        return None;
    }
    Some(h * 60 + m)
}

/// Formats minutes as `HH:MM`, wrapping at midnight.
pub fn format_clock(minute: i32) -> String {
    let m = minute.rem_euclid(MINUTES_PER_DAY);
    format!("{:02}:{:02}", m / 60, m % 60)
}

fn format_end(minute: i32) -> String {
    if minute == MINUTES_PER_DAY {
        "24:00".to_string()
    } else {
        format_clock(minute)
    }
}

/// Availability on one weekday: closed, continuous, or split.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayWindow {
    /// Ordered segments. Empty = closed.
    pub segments: Vec<TimeWindow>,
}

impl DayWindow {
    /// A closed day.
    pub fn closed() -> Self {
        Self::default()
    }

    /// A single continuous window.
    pub fn continuous(start_min: i32, end_min: i32) -> Self {
        Self {
            segments: vec![TimeWindow::new(start_min, end_min)],
        }
    }

    /// Parses a window string.
    ///
    /// `-`, `LIBRE`, `DESCANSO` and blank strings mean closed. Parts are
    /// joined by `/` for split windows.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() || matches!(s.to_uppercase().as_str(), "-" | "LIBRE" | "DESCANSO") {
            return Ok(Self::closed());
        }
        let mut segments = s
            .split('/')
            .map(|part| TimeWindow::parse(part.trim()))
            .collect::<Result<Vec<_>>>()?;
        segments.sort_by_key(|w| w.start_min);
        Ok(Self { segments })
    }

    /// Whether the agent is unavailable on this day.
    pub fn is_closed(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether this is a split (multi-segment) window.
    pub fn is_split(&self) -> bool {
        self.segments.len() > 1
    }

    /// Sum of segment lengths in minutes.
    pub fn total_minutes(&self) -> i32 {
        self.segments.iter().map(TimeWindow::duration_min).sum()
    }

    /// Whether `window` fits entirely inside one segment.
    pub fn fits(&self, window: &TimeWindow) -> bool {
        self.segments.iter().any(|s| s.encloses(window))
    }

    /// `/`-joined label of all segments.
    pub fn label(&self) -> String {
        self.segments
            .iter()
            .map(TimeWindow::label)
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Availability for each weekday, Monday first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyAvailability {
    days: [DayWindow; 7],
}

impl WeeklyAvailability {
    /// Creates an availability with every day closed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window for a weekday.
    pub fn with_day(mut self, weekday: Weekday, window: DayWindow) -> Self {
        self.set(weekday, window);
        self
    }

    /// Sets the same window on several weekdays.
    pub fn with_days(mut self, weekdays: &[Weekday], window: DayWindow) -> Self {
        for &wd in weekdays {
            self.set(wd, window.clone());
        }
        self
    }

    /// Parses seven window strings, Monday first.
    pub fn parse_week(days: [&str; 7]) -> Result<Self> {
        let mut week = Self::new();
        for (idx, raw) in days.iter().enumerate() {
            week.days[idx] = DayWindow::parse(raw)?;
        }
        Ok(week)
    }

    /// Replaces the window for a weekday.
    pub fn set(&mut self, weekday: Weekday, window: DayWindow) {
        self.days[weekday.num_days_from_monday() as usize] = window;
    }

    /// Declared window for a weekday (may be closed).
    pub fn day(&self, weekday: Weekday) -> &DayWindow {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    /// Window used for scheduling on `weekday`.
    ///
    /// Weekend days without an explicit window borrow one from a nearby
    /// day: Saturday → Friday → Monday, Sunday → Saturday → Friday → Monday.
    pub fn effective(&self, weekday: Weekday) -> &DayWindow {
        let own = self.day(weekday);
        if !own.is_closed() {
            return own;
        }
        let fallback: &[Weekday] = match weekday {
            Weekday::Sat => &[Weekday::Fri, Weekday::Mon],
            Weekday::Sun => &[Weekday::Sat, Weekday::Fri, Weekday::Mon],
            _ => &[],
        };
        fallback
            .iter()
            .map(|&wd| self.day(wd))
            .find(|w| !w.is_closed())
            .unwrap_or(own)
    }
}
