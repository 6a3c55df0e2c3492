//! RFC 3339 timestamps on the wire.
//!
//! Use with `#[serde(with = "crate::utils::time")]` on `OffsetDateTime` fields.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Deserialize an RFC 3339 formatted string into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = format(datetime).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// Parse an RFC 3339 string such as `2024-01-01T00:00:00Z`.
pub fn parse(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(s, &Rfc3339)
}

/// Format a timestamp as RFC 3339.
pub fn format(datetime: &OffsetDateTime) -> Result<String, time::error::Format> {
    datetime.format(&Rfc3339)
}

/// The current time in UTC.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
