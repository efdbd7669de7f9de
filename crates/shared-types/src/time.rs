//! # Timestamps
//!
//! All timestamps on the wire, and therefore in every canonical form that is
//! hashed for signing, use ISO-8601 UTC with exactly three fractional digits.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// `2024-05-01T12:00:00.000Z`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a timestamp in the wire format.
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a wire timestamp. Any RFC 3339 timestamp is accepted.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Ok(parsed.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
            .map(|naive| Utc.from_utc_datetime(&naive)),
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` fields in the wire format.
pub mod iso8601_millis_opt {
    use super::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(timestamp) => serializer.serialize_str(&format_timestamp(timestamp)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse_timestamp(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
