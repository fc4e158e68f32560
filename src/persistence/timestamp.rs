//! Timestamp helpers for the storage layer.
//!
//! Every persisted timestamp comes from one UTC clock and one formatter:
//! ISO-8601 at seconds precision with a `Z` suffix. Parsing rejects strings
//! without an explicit offset, so naive datetimes never round-trip through
//! the database.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::error::{LexigenError, Result};

/// Returns the current UTC time truncated to whole seconds.
///
/// Truncation keeps stored values identical to their serialized form, so
/// `parse_iso(to_iso(t)) == t` holds for every timestamp we produce.
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    now - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
}

/// Formats a timezone-aware timestamp as ISO-8601 seconds precision UTC.
pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an ISO-8601 timestamp, requiring an explicit UTC offset.
pub fn parse_iso(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LexigenError::persistence(format!("Invalid timestamp '{s}': {e}")))
}

/// Parses an optional ISO-8601 column.
pub fn parse_iso_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_iso).transpose()
}
