//! Local-time to UTC conversion.
//!
//! The remote API reports timestamps as naive local times in the user's
//! timezone. Every record is stored in UTC, so collectors go through
//! [`localize`] before building a [`super::Record`].

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Error for timestamps the API returned in an unrecognised shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampError(pub String);

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised timestamp '{}'", self.0)
    }
}

impl std::error::Error for TimestampError {}

/// Interprets `naive` as wall-clock time in `tz` and converts it to UTC.
///
/// Ambiguous times (the repeated hour when DST ends) resolve to the earlier
/// instant. Times inside the DST gap do not exist locally and are shifted
/// forward by one hour.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                LocalResult::None => Utc.from_utc_datetime(&naive),
            }
        }
    }
}

/// UTC instant of local midnight at the start of `date`.
pub fn midnight_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    localize(date.and_time(chrono::NaiveTime::MIN), tz)
}

/// Parses an API timestamp and converts it to UTC.
///
/// Accepted shapes:
/// - `2024-06-01` (local midnight)
/// - `2024-06-01T08:00`, `2024-06-01T08:00:00`, `2024-06-01T08:00:00.000` (local)
/// - RFC 3339 with an explicit offset or `Z` (already absolute)
pub fn parse_local_timestamp(raw: &str, tz: Tz) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(midnight_utc(date, tz));
    }

    const FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| localize(naive, tz))
        .ok_or_else(|| TimestampError(raw.to_string()))
}
