//! Timestamp canonicalization for stored payloads.
//!
//! Every string in a payload that reads as a date-time is rewritten to a single
//! textual form before the payload is written: UTC, RFC 3339, `Z` suffix, with as
//! many fractional digits as needed to keep full precision. Offset-less date-times
//! are taken to be UTC. Plain dates (`2025-11-01`) and other strings are left alone.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Canonical text for a timestamp.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a date-time in any accepted form.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // Cheap shape check before attempting the parsers.
    let bytes = raw.as_bytes();
    if bytes.len() < 19
        || bytes[4] != b'-'
        || bytes[7] != b'-'
        || !matches!(bytes[10], b'T' | b' ')
    {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Rewrite every timestamp-shaped string in `value`, recursively.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::String(raw) => match parse_timestamp(&raw) {
            Some(timestamp) => Value::String(format_timestamp(&timestamp)),
            None => Value::String(raw),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(field, value)| (field, canonicalize(value)))
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Serialize `payload` and canonicalize it in one pass.
///
/// Fails with [`CacheError::SerializationFailure`](crate::CacheError) when the payload
/// has no JSON form (for example a map with non-string keys).
pub fn to_canonical_value<P: Serialize>(payload: &P) -> Result<Value> {
    Ok(canonicalize(serde_json::to_value(payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_offsets_are_normalized_to_utc() {
        let value = canonicalize(json!("2025-11-01T15:30:00.123456+05:30"));
        assert_eq!(value, json!("2025-11-01T10:00:00.123456Z"));
    }

    #[test]
    fn test_naive_datetimes_are_taken_as_utc() {
        assert_eq!(canonicalize(json!("2025-11-01T10:00:00")), json!("2025-11-01T10:00:00Z"));
        assert_eq!(canonicalize(json!("2025-11-01 10:00:00.5")), json!("2025-11-01T10:00:00.500Z"));
    }

    #[test]
    fn test_nested_structures_are_walked() {
        let value = canonicalize(json!({
            "prediction_date": "2025-11-01",
            "transits": [
                {"planet": "Mars", "transit_start": "2025-10-27T08:00:00+00:00"},
            ],
            "confidence": 0.72,
        }));

        assert_eq!(value["prediction_date"], json!("2025-11-01"));
        assert_eq!(value["transits"][0]["transit_start"], json!("2025-10-27T08:00:00Z"));
        assert_eq!(value["transits"][0]["planet"], json!("Mars"));
        assert_eq!(value["confidence"], json!(0.72));
    }

    #[test]
    fn test_precision_is_kept() {
        let timestamp = Utc.with_ymd_and_hms(2025, 11, 1, 10, 0, 0).unwrap()
            + chrono::TimeDelta::nanoseconds(123_456_789);
        let text = format_timestamp(&timestamp);

        assert_eq!(text, "2025-11-01T10:00:00.123456789Z");
        assert_eq!(parse_timestamp(&text), Some(timestamp));
    }

    #[test]
    fn test_non_timestamps_pass_through() {
        for raw in ["RELIANCE", "2025-11-01", "Mars enters Leo 2025-11-01", ""] {
            assert_eq!(canonicalize(json!(raw)), json!(raw));
        }
    }

    #[test]
    fn test_unserializable_payload_is_reported() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys have no JSON form");

        let err = to_canonical_value(&bad).unwrap_err();
        assert!(matches!(err, crate::CacheError::SerializationFailure(_)));
    }
}
