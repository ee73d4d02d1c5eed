//! Timestamp helpers
//!
//! Upstream artifacts are written by Python jobs, so timestamps show up as
//! RFC 3339, naive ISO-8601 (assumed UTC) or unix seconds/millis.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse a timestamp string in any of the accepted layouts
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    raw.parse::<i64>().ok().and_then(from_unix)
}

/// Interpret a unix timestamp in seconds or milliseconds
#[must_use]
pub fn from_unix(value: i64) -> Option<DateTime<Utc>> {
    // anything past 1e11 is millis (year 5138 in seconds)
    if value.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

/// Parse a JSON value (string or number) into a timestamp
#[must_use]
pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_unix),
        _ => None,
    }
}

/// Serde helper for lenient optional timestamps
///
/// # Errors
///
/// Only fails if the input is not valid JSON for the deserializer.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(timestamp_from_value))
}
