//! Calendar-month and fiscal-quarter window starts.
//!
//! Every window is computed in the organization's time zone, never the caller's,
//! and returned as a UTC instant. Fiscal quarters are calendar quarters shifted
//! forward by one month, so they begin on Feb 1, May 1, Aug 1 and Nov 1.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::America::New_York;

/// The span a monthly quota applies to. `key` is the `YYYY-MM` of the month in
/// the organizational zone and is what persistence indexes on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaPeriod {
    pub start: DateTime<Utc>,
    pub key: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrgCalendar {
    zone: Tz,
}

impl Default for OrgCalendar {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_ZONE)
    }
}

impl OrgCalendar {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        name.trim().parse::<Tz>().ok().map(Self::new)
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn month_start(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = instant.with_timezone(&self.zone);
        self.local_month_start(local.year(), local.month()).unwrap_or(instant)
    }

    pub fn quarter_start(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = instant.with_timezone(&self.zone);
        let (year, month) = fiscal_quarter_month(local.year(), local.month());
        self.local_month_start(year, month).unwrap_or(instant)
    }

    pub fn quota_period(&self, instant: DateTime<Utc>) -> QuotaPeriod {
        let local = instant.with_timezone(&self.zone);
        QuotaPeriod {
            start: self.month_start(instant),
            key: format!("{:04}-{:02}", local.year(), local.month()),
        }
    }

    fn local_month_start(&self, year: i32, month: u32) -> Option<DateTime<Utc>> {
        let midnight = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
        let resolved = match self.zone.from_local_datetime(&midnight) {
            LocalResult::Single(start) => start,
            LocalResult::Ambiguous(earliest, _) => earliest,
            // midnight skipped by a DST jump; the day starts at the first valid instant
            LocalResult::None => {
                self.zone.from_local_datetime(&(midnight + Duration::hours(1))).earliest()?
            }
        };
        Some(resolved.with_timezone(&Utc))
    }
}

/// Month number (and year) that opens the fiscal quarter containing `month`.
/// January belongs to the quarter that began the previous November.
pub fn fiscal_quarter_month(year: i32, month: u32) -> (i32, u32) {
    match month {
        2..=4 => (year, 2),
        5..=7 => (year, 5),
        8..=10 => (year, 8),
        11 | 12 => (year, 11),
        _ => (year - 1, 11),
    }
}

pub fn month_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    OrgCalendar::default().month_start(instant)
}

pub fn quarter_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    OrgCalendar::default().quarter_start(instant)
}
