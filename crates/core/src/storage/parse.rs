//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::{Candidate, Choice, Influence, RoomStatus};

fn conversion_error(message: String) -> SqlError {
    SqlError::FromSqlConversionFailure(0, Type::Text, message.into())
}

/// Parse a UUID from a database string column
pub fn parse_uuid(s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s).map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse an optional DateTime from an RFC3339 string
pub fn parse_datetime_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, SqlError> {
    s.map(|s| parse_datetime(&s)).transpose()
}

pub fn parse_status(s: &str) -> Result<RoomStatus, SqlError> {
    RoomStatus::from_str(s).ok_or_else(|| conversion_error(format!("unknown room status {s:?}")))
}

pub fn parse_choice(s: &str) -> Result<Choice, SqlError> {
    Choice::from_str(s).ok_or_else(|| conversion_error(format!("unknown choice {s:?}")))
}

pub fn parse_candidate(s: &str) -> Result<Candidate, SqlError> {
    Candidate::decode(s).ok_or_else(|| conversion_error(format!("malformed candidate {s:?}")))
}

/// Nullable chapter order column
pub fn order_from_sql(value: Option<i64>) -> Option<u32> {
    value.map(|v| v as u32)
}

pub fn influence_from_sql(units: i64) -> Influence {
    Influence(units)
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
