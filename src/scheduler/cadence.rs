//! When a job is due.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};

/// How often a job runs. Boundaries are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval from the previous run.
    Every(Duration),
    /// Next UTC midnight.
    DayBoundary,
    /// Midnight UTC on the first of the next month.
    MonthBoundary,
}

impl Cadence {
    /// First run time strictly after `t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let next = match self {
            Cadence::Every(interval) => t.checked_add_signed((*interval).max(Duration::seconds(1))),
            Cadence::DayBoundary => t.date_naive().succ_opt().map(midnight),
            Cadence::MonthBoundary => NaiveDate::from_ymd_opt(t.year(), t.month(), 1)
                .and_then(|first| first.checked_add_months(Months::new(1)))
                .map(midnight),
        };
        next.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
