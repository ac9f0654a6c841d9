use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::date_util::{month_end, month_start, year_month};
use crate::filter::{DateWindow, FilterSpec};

/// One calendar-month interval. All time-series outputs align 1:1 with the
/// bucket list for a given filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    pub label: String,
    /// Inclusive start instant (midnight UTC, day 1).
    pub start: DateTime<Utc>,
    /// Inclusive end instant (last nanosecond of the month).
    pub end: DateTime<Utc>,
}

impl TimeBucket {
    fn month(year: i32, month: u32) -> Self {
        let start = month_start(year, month);
        Self {
            label: start.format("%b %Y").to_string(),
            start,
            end: month_end(year, month),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Produce the ordered month buckets covering a filter's window.
///
/// `reference` resolves the default window to a concrete year, so callers
/// control "now" and results stay deterministic. An open-ended custom range
/// falls back to the reference year rather than erroring.
pub fn month_buckets(spec: &FilterSpec, reference: DateTime<Utc>) -> Vec<TimeBucket> {
    match &spec.window {
        DateWindow::All => full_year(reference.year()),
        DateWindow::Month(y, m) => vec![TimeBucket::month(*y, *m)],
        DateWindow::Custom {
            start: Some(s),
            end: Some(e),
        } => months_between(*s, *e),
        DateWindow::Custom { .. } => full_year(reference.year()),
    }
}

fn full_year(year: i32) -> Vec<TimeBucket> {
    (1..=12).map(|m| TimeBucket::month(year, m)).collect()
}

/// Every month whose span intersects `[start, end]`, first and last partial
/// months included. An inverted range collapses to the start month.
fn months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<TimeBucket> {
    let (mut year, mut month) = year_month(start);
    let (end_year, end_month) = year_month(end.max(start));

    let mut buckets = Vec::new();
    loop {
        buckets.push(TimeBucket::month(year, month));
        if (year, month) == (end_year, end_month) {
            break;
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    buckets
}
