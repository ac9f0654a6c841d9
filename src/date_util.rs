use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

/// Midnight UTC on the first day of a month.
pub fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}

/// The last representable instant of a month (inclusive end).
pub fn month_end(year: i32, month: u32) -> DateTime<Utc> {
    next_month_start(year, month) - Duration::nanoseconds(1)
}

/// Midnight UTC on the first day of the following month.
pub fn next_month_start(year: i32, month: u32) -> DateTime<Utc> {
    if month == 12 {
        month_start(year + 1, 1)
    } else {
        month_start(year, month + 1)
    }
}

/// The (year, month) pair an instant falls in.
pub fn year_month(instant: DateTime<Utc>) -> (i32, u32) {
    (instant.year(), instant.month())
}
