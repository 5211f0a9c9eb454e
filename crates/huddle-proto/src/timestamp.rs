//! ISO-8601 timestamp handling.
//!
//! The backend stores UTC datetimes and serializes them either with an explicit
//! offset (`2024-01-01T00:00:00Z`, `...+00:00`) or, for older records, without
//! one (`2024-01-01T00:00:00.123456`). Offset-less values are taken as UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::{ProtocolError, Result};

/// Accepted layouts for offset-less timestamps.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp into UTC.
pub fn parse(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ProtocolError::InvalidTimestamp(raw.to_string()))
}

/// Format a UTC timestamp the way outbound frames carry it.
pub fn format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
