//! Date-range partitioning.
//!
//! Remote endpoints cap how many days one request may cover. [`plan`] splits
//! an inclusive date range into consecutive [`Window`]s no longer than a
//! collector's [`MaxSpan`].

use chrono::{Duration, NaiveDate};
use std::fmt;

/// Inclusive calendar-date range in the local timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self::new(day, day)
    }

    /// Number of calendar days covered (at least 1).
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days().max(0) + 1
    }

    /// Days in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.days()).map(move |i| start + Duration::days(i))
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Largest window one request may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxSpan {
    Days(u32),
    Unbounded,
}

/// Lazily yields consecutive sub-windows of a range.
///
/// A clone carries the current position, so cloning before iteration gives
/// a replayable plan.
#[derive(Debug, Clone)]
pub struct WindowPlan {
    next_start: Option<NaiveDate>,
    end: NaiveDate,
    span_days: Option<i64>,
}

impl Iterator for WindowPlan {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let start = self.next_start?;
        let end = match self.span_days {
            Some(span) => {
                let candidate = start + Duration::days(span - 1);
                if candidate < self.end {
                    candidate
                } else {
                    self.end
                }
            }
            None => self.end,
        };

        self.next_start = if end < self.end {
            Some(end + Duration::days(1))
        } else {
            None
        };
        Some(Window::new(start, end))
    }
}

/// Splits `range` into windows of at most `span` days.
///
/// An inverted range (start after end) or a span that already covers the
/// whole range yields the range itself as the only window.
pub fn plan(range: Window, span: MaxSpan) -> WindowPlan {
    let span_days = match span {
        MaxSpan::Days(days) if range.start <= range.end => Some(i64::from(days.max(1))),
        _ => None,
    };

    WindowPlan {
        next_start: Some(range.start),
        end: range.end,
        span_days,
    }
}
