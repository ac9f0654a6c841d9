use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use regex::Regex;

use crate::date_util::{month_end, month_start};
use crate::error::{Error, Result};
use crate::model::{CancellationEvent, Customer, MetricSample, Snapshot, SupportTicket, UpgradeEvent};

static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})?\.\.(\d{4}-\d{2}-\d{2})?$").unwrap()
});

/// The date-window selector applied before aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateWindow {
    /// No date restriction; buckets default to the reference year.
    All,
    /// A single calendar month.
    Month(i32, u32),
    /// An explicit range. A range missing either bound degrades to `All`.
    Custom {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

/// A composable filter: date window plus an optional project selection.
/// An empty project set means no project filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub window: DateWindow,
    pub project_ids: BTreeSet<String>,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            window: DateWindow::All,
            project_ids: BTreeSet::new(),
        }
    }
}

impl FilterSpec {
    /// Parse a window selector string plus a project id list.
    ///
    /// Supported window formats:
    /// - `all` — the full default window
    /// - `2025-03` — a single month
    /// - `2025-01-01..2025-03-15` — an inclusive custom range
    /// - `2025-01-01..` / `..2025-03-15` — open-ended (degrades to `all`)
    pub fn parse(window: &str, project_ids: &[String]) -> Result<Self> {
        let window = Self::parse_window(window)?;
        Ok(Self {
            window,
            project_ids: project_ids.iter().cloned().collect(),
        })
    }

    fn parse_window(s: &str) -> Result<DateWindow> {
        let s = s.trim();

        if s.eq_ignore_ascii_case("all") {
            return Ok(DateWindow::All);
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let month: u32 = caps[2].parse().unwrap();
            if (1..=12).contains(&month) {
                return Ok(DateWindow::Month(year, month));
            }
            return Err(Error::FilterParse(format!("month out of range: {s}")));
        }

        if let Some(caps) = RE_RANGE.captures(s) {
            let start = caps.get(1).map(|m| parse_day_start(m.as_str())).transpose()?;
            let end = caps.get(2).map(|m| parse_day_end(m.as_str())).transpose()?;
            return Ok(DateWindow::Custom { start, end });
        }

        Err(Error::FilterParse(format!("unrecognized window: {s}")))
    }

    /// Resolve the window to an inclusive instant range. `None` means no
    /// date restriction: both `all` and a custom range missing a bound land
    /// here, so an inconsistent range degrades instead of erroring.
    pub fn resolved_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match &self.window {
            DateWindow::All => None,
            DateWindow::Month(y, m) => Some((month_start(*y, *m), month_end(*y, *m))),
            DateWindow::Custom {
                start: Some(s),
                end: Some(e),
            } => Some((*s, *e)),
            DateWindow::Custom { .. } => None,
        }
    }

    pub fn has_project_filter(&self) -> bool {
        !self.project_ids.is_empty()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateWindow::All => write!(f, "all"),
            DateWindow::Month(y, m) => write!(f, "{y}-{m:02}"),
            DateWindow::Custom { start, end } => {
                let fmt = |d: &Option<DateTime<Utc>>| {
                    d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
                };
                write!(f, "{}..{}", fmt(start), fmt(end))
            }
        }
    }
}

fn parse_day_start(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::FilterParse(format!("invalid date: {s}")))?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()))
}

fn parse_day_end(s: &str) -> Result<DateTime<Utc>> {
    // Inclusive of the whole named day.
    Ok(parse_day_start(s)? + Duration::days(1) - Duration::nanoseconds(1))
}

fn in_range(date: Option<DateTime<Utc>>, range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> bool {
    match range {
        // No date restriction: records with missing dates survive too.
        None => true,
        Some((start, end)) => match date {
            Some(d) => d >= start && d <= end,
            None => false,
        },
    }
}

fn intersects(project_ids: &[String], selection: &BTreeSet<String>) -> bool {
    project_ids.iter().any(|id| selection.contains(id))
}

/// Every collection of a snapshot, narrowed once by a `FilterSpec`.
///
/// Customers, tickets, and upgrades carry their own project lists and filter
/// directly; samples and cancellations carry none and are kept only when
/// their owning customer survived the customer filter for the same window.
#[derive(Debug)]
pub struct FilteredRecords<'a> {
    pub customers: Vec<&'a Customer>,
    pub samples: Vec<&'a MetricSample>,
    pub tickets: Vec<&'a SupportTicket>,
    pub upgrades: Vec<&'a UpgradeEvent>,
    pub cancellations: Vec<&'a CancellationEvent>,
}

impl<'a> FilteredRecords<'a> {
    pub fn build(snapshot: &'a Snapshot, spec: &FilterSpec) -> Self {
        let range = spec.resolved_range();
        let by_project = spec.has_project_filter();

        let customers: Vec<&Customer> = snapshot
            .customers
            .iter()
            .filter(|c| in_range(c.created_at, range))
            .filter(|c| !by_project || intersects(&c.project_ids, &spec.project_ids))
            .collect();

        // Transitive membership basis for samples and cancellations.
        let customer_ids: HashSet<&str> = customers.iter().map(|c| c.id.as_str()).collect();

        let samples = snapshot
            .metric_samples
            .iter()
            .filter(|s| in_range(s.sampled_at, range))
            .filter(|s| !by_project || customer_ids.contains(s.customer_id.as_str()))
            .collect();

        let tickets = snapshot
            .support_tickets
            .iter()
            .filter(|t| in_range(t.opened_at, range))
            .filter(|t| !by_project || intersects(&t.project_ids, &spec.project_ids))
            .collect();

        let upgrades = snapshot
            .upgrades
            .iter()
            .filter(|u| in_range(u.upgraded_at, range))
            .filter(|u| !by_project || intersects(&u.project_ids, &spec.project_ids))
            .collect();

        let cancellations = snapshot
            .cancellations
            .iter()
            .filter(|c| in_range(c.cancelled_at, range))
            .filter(|c| !by_project || customer_ids.contains(c.customer_id.as_str()))
            .collect();

        Self {
            customers,
            samples,
            tickets,
            upgrades,
            cancellations,
        }
    }

    /// Look up a filtered customer by id.
    pub fn customer(&self, id: &str) -> Option<&'a Customer> {
        self.customers.iter().find(|c| c.id == id).copied()
    }
}
