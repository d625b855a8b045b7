//! Shift candidates.

use serde::{Deserialize, Serialize};

use super::{DayWindow, TimeWindow};

/// A shift that may be assigned to one agent on one date.
///
/// Continuous shifts have a single segment; split shifts have several and
/// their duration is the sum of the segments, not `end - start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftCandidate {
    /// First worked minute.
    pub start_min: i32,
    /// End of the last segment (may exceed 1440).
    pub end_min: i32,
    /// Worked minutes.
    pub duration_minutes: i32,
    /// Display label (`08:00-16:00`, `09:00-14:00/15:00-18:00`).
    pub label: String,
    /// Worked segments.
    pub segments: Vec<TimeWindow>,
}

impl ShiftCandidate {
    /// A continuous shift over `[start_min, end_min)`.
    pub fn continuous(start_min: i32, end_min: i32) -> Self {
        let w = TimeWindow::new(start_min, end_min);
        Self {
            start_min,
            end_min,
            duration_minutes: w.duration_min(),
            label: w.label(),
            segments: vec![w],
        }
    }

    /// A shift made of the segments of a (possibly split) day window.
    ///
    /// Returns `None` for a closed window.
    pub fn from_window(window: &DayWindow) -> Option<Self> {
        let first = window.segments.first()?;
        let last = window.segments.last()?;
        Some(Self {
            start_min: first.start_min,
            end_min: last.end_min,
            duration_minutes: window.total_minutes(),
            label: window.label(),
            segments: window.segments.clone(),
        })
    }

    /// Whether the shift has more than one segment.
    pub fn is_split(&self) -> bool {
        self.segments.len() > 1
    }

    /// Worked minutes overlapping `[start, end)`.
    pub fn overlap_with(&self, start_min: i32, end_min: i32) -> i32 {
        self.segments
            .iter()
            .map(|s| s.overlap_with(start_min, end_min))
            .sum()
    }

    /// Indices of the half-hour buckets (0..48) the shift works in.
    ///
    /// A bucket counts when the shift works any part of it; minutes after
    /// midnight belong to the next day and are ignored.
    pub fn half_hour_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..48usize).filter(move |&i| {
            let s = i as i32 * 30;
            self.overlap_with(s, s + 30) > 0
        })
    }

    /// Deduplication key.
    pub fn key(&self) -> (i32, i32) {
        (self.start_min, self.end_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuous_shift() {
        let s = ShiftCandidate::continuous(480, 960);
        assert_eq!(s.duration_minutes, 480);
        assert_eq!(s.label, "08:00-16:00");
        assert!(!s.is_split());
        let slots: Vec<usize> = s.half_hour_slots().collect();
        assert_eq!(slots.first(), Some(&16));
        assert_eq!(slots.last(), Some(&31));
        assert_eq!(slots.len(), 16);
    }

    #[test]
    fn test_split_shift() {
        let w = DayWindow::parse("09:00-13:00/15:00-19:00").unwrap();
        let s = ShiftCandidate::from_window(&w).unwrap();
        assert!(s.is_split());
        assert_eq!(s.start_min, 540);
        assert_eq!(s.end_min, 1140);
        assert_eq!(s.duration_minutes, 480);
        assert_eq!(s.overlap_with(780, 900), 0); // lunch gap
        assert_eq!(s.half_hour_slots().count(), 16);
    }

    #[test]
    fn test_overnight_slots_clip_at_midnight() {
        let s = ShiftCandidate::continuous(1320, 1800); // 22:00-06:00
        assert_eq!(s.half_hour_slots().count(), 4);
        assert_eq!(s.label, "22:00-06:00");
    }

    #[test]
    fn test_closed_window_has_no_shift() {
        assert!(ShiftCandidate::from_window(&DayWindow::closed()).is_none());
    }
}
