//! Shared parsing utilities for flat upstream attributes.
//!
//! Socrata exports scalars inconsistently: numbers may arrive as JSON
//! numbers or strings, and timestamps with or without fractional seconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Parses a Socrata-style timestamp into wall-clock time.
///
/// Accepts ISO 8601 with a `T` or space separator, optional fractional
/// seconds, an optional UTC offset (dropped, keeping local wall time), or a
/// bare date (midnight).
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Reads a timestamp attribute.
#[must_use]
pub fn timestamp_attr(value: Option<&Value>) -> Option<NaiveDateTime> {
    value?.as_str().and_then(parse_timestamp)
}

/// Reads a numeric attribute given as a JSON number or numeric string.
#[must_use]
pub fn f64_attr(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Reads an identifier or name attribute given as a string or number.
/// Blank strings are treated as missing.
#[must_use]
pub fn string_attr(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
