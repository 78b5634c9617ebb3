//! Column decoding shared by the query modules.

use chrono::{DateTime, NaiveDateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::Row;
use uuid::Uuid;

use crate::DbError;

/// Reads a uuid column selected as text.
pub(crate) fn uuid_column(row: &Row, column: &str) -> Result<Uuid, DbError> {
    let text: String = row.to_value(column).unwrap_or_default();
    Uuid::parse_str(&text).map_err(|e| DbError::Conversion {
        message: format!("Invalid uuid in column {column}: {e}"),
    })
}

/// Reads a nullable uuid column selected as text.
pub(crate) fn optional_uuid_column(row: &Row, column: &str) -> Option<Uuid> {
    let text: Option<String> = row.to_value(column).unwrap_or(None);
    text.and_then(|t| Uuid::parse_str(&t).ok())
}

/// Reads a nullable `TIMESTAMP` column as UTC.
pub(crate) fn timestamp_column(row: &Row, column: &str) -> Option<DateTime<Utc>> {
    let naive: Option<NaiveDateTime> = row.to_value(column).unwrap_or(None);
    naive.map(|n| DateTime::<Utc>::from_naive_utc_and_offset(n, Utc))
}

/// Reads a nullable JSON column selected as text.
///
/// Malformed documents are logged and reported as absent.
pub(crate) fn json_column(row: &Row, column: &str) -> Option<serde_json::Value> {
    let text: Option<String> = row.to_value(column).unwrap_or(None);
    text.and_then(|t| match serde_json::from_str(&t) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring malformed JSON in column {column}: {e}");
            None
        }
    })
}

/// Converts an optional JSON document into a query parameter.
pub(crate) fn json_param(
    value: Option<&serde_json::Value>,
) -> Result<switchy_database::DatabaseValue, DbError> {
    Ok(match value {
        Some(v) => switchy_database::DatabaseValue::String(serde_json::to_string(v)?),
        None => switchy_database::DatabaseValue::Null,
    })
}
