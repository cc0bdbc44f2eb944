//! Timestamp utilities

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};

use crate::{Error, Result};

/// Wire format used by the scheduling solver ("YYYY-MM-DDTHH:MM")
pub const SOLVER_MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Drop seconds and sub-second precision
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

/// Format a timestamp for the solver wire format, truncated to the minute
pub fn to_solver_minute(ts: DateTime<Utc>) -> String {
    truncate_to_minute(ts).format(SOLVER_MINUTE_FORMAT).to_string()
}

/// Fixed-width RFC 3339 form used for TEXT timestamp columns
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp stored by [`format_timestamp`] (any RFC 3339 offset accepted)
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::malformed("timestamp", s))
}

/// Length of the interval in fractional hours (negative intervals count as zero)
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / 3_600_000.0
}

/// Half-open interval overlap: `[a_start, a_end)` intersects `[b_start, b_end)`
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}
