//! Lenient timestamp handling.
//!
//! Entry timestamps travel as raw strings: front matter dates written by hand,
//! RFC 3339 values from the database. Nothing here fails loudly; a value that
//! cannot be read sorts as the Unix epoch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp in any of the shapes authors and the store produce.
///
/// Accepts RFC 3339, bare dates (`2024-06-01`, taken as midnight UTC) and
/// naive date-times with a `T` or space separator (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Milliseconds since the epoch used for ordering. Unreadable values are 0.
pub fn sort_key(raw: &str) -> i64 {
    parse_timestamp(raw).map_or(0, |dt| dt.timestamp_millis())
}

/// Current time as an RFC 3339 string, the format rows are written with.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
