//! Change-log timestamps.
//!
//! Both logs store timestamps as RFC 3339 UTC text with exactly six
//! fractional digits, so text order equals time order and a value survives
//! a round trip through either log unchanged.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Drops precision below one microsecond.
#[must_use]
pub fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
#[must_use]
pub fn format(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses any RFC 3339 timestamp, converting to UTC.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidField`] naming `field` if the text is
/// not RFC 3339.
pub fn parse(field: &'static str, text: &str) -> ProtocolResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| truncate(ts.with_timezone(&Utc)))
        .map_err(|e| ProtocolError::invalid_field(field, format!("{text}: {e}")))
}

/// Serde adapter for fixed-precision timestamps.
pub mod micros {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes with six fractional digits.
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*ts))
    }

    /// Deserializes any RFC 3339 timestamp.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse("timestamp", &text).map_err(serde::de::Error::custom)
    }
}
