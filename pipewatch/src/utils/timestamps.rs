//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`
///
/// # Examples
///
/// ```
/// use pipewatch::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Formats a timestamp as ISO 8601 with microsecond precision.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Parses an RFC 3339 / ISO 8601 timestamp with an offset into UTC.
#[must_use]
pub fn parse_iso8601(s: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Formats a timestamp for use inside file names (no colons).
#[must_use]
pub fn file_stamp(dt: &Timestamp) -> String {
    dt.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}

/// Seconds elapsed from `earlier` to `later`, with sub-second precision.
///
/// Negative when `later` precedes `earlier`.
#[must_use]
pub fn seconds_between(earlier: &Timestamp, later: &Timestamp) -> f64 {
    let delta = *later - *earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

/// Hours elapsed from `earlier` to `later`.
#[must_use]
pub fn hours_between(earlier: &Timestamp, later: &Timestamp) -> f64 {
    seconds_between(earlier, later) / 3600.0
}
