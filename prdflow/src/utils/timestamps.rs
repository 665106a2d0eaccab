//! Timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamp type used throughout the run model.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an RFC 3339 string with microseconds.
///
/// # Examples
///
/// ```
/// use prdflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with('Z'));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&now_utc())
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as RFC 3339 with microsecond precision.
#[must_use]
pub fn format_iso8601(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Returns the whole milliseconds elapsed since `since`, clamped at zero.
#[must_use]
pub fn elapsed_ms(since: &Timestamp) -> u64 {
    u64::try_from((now_utc() - *since).num_milliseconds()).unwrap_or(0)
}
