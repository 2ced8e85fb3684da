use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Half-open UTC interval `[start, end)` covering one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Parse a `YYYY-MM-DD` date. The day after it must also be representable.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| Error::InvalidDate(format!("{s}: {e}")))?;
    if date.succ_opt().is_none() {
        return Err(Error::InvalidDate(format!("{s}: out of range")));
    }
    Ok(date)
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn day_range(date: NaiveDate) -> DayRange {
    let start = start_of_day(date);
    DayRange {
        start,
        end: start + Duration::days(1),
    }
}

/// Cutoff for the comment lookback window: `lookback_days` before the start of `date`.
pub fn lookback_since(date: NaiveDate, lookback_days: u32) -> Result<DateTime<Utc>> {
    start_of_day(date)
        .checked_sub_signed(Duration::days(i64::from(lookback_days)))
        .ok_or_else(|| {
            Error::InvalidDate(format!(
                "{lookback_days} days before {date} is out of range"
            ))
        })
}

/// RFC 3339 with millisecond precision and a `Z` suffix, the form the API filters accept.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
