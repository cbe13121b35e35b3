//! Shared storage helper functions.
//!
//! Timestamp and integer conversions used by the SQLite backend. Timestamps
//! are stored as fixed-width RFC 3339 UTC strings so that lexical order is
//! time order and range filters can compare the text directly.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::StorageError;

use super::Result;

/// Render an instant in the fixed-width storage format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{raw}: {e}")))
}

pub fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

/// Point amounts are unsigned in the domain and INTEGER in SQLite.
pub fn amount_to_db(amount: u64) -> Result<i64> {
    i64::try_from(amount)
        .map_err(|_| StorageError::Unsupported(format!("amount {amount} exceeds storage range")))
}

pub fn amount_from_db(raw: i64) -> Result<u64> {
    u64::try_from(raw).map_err(|_| StorageError::Corrupt(format!("negative amount {raw}")))
}

pub fn count_from_db(raw: i64) -> Result<u32> {
    u32::try_from(raw).map_err(|_| StorageError::Corrupt(format!("counter out of range: {raw}")))
}

/// Parse a TEXT column through `FromStr`, reporting bad values as corrupt rows.
pub fn parse_column<T>(column: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StorageError::Corrupt(format!("{column}: {e}")))
}
