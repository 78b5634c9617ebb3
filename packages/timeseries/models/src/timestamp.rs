//! Conversions between millisecond timestamps and datetimes.
//!
//! Request parameters accept either a Unix timestamp in milliseconds or an
//! ISO 8601 datetime that carries a time zone.

use chrono::{DateTime, NaiveDateTime, TimeZone as _, Utc};

/// Errors produced while parsing a timestamp parameter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    /// The input is neither an integer nor a datetime.
    #[error("Not a valid value: {0}.")]
    Invalid(String),

    /// The input is a datetime without an offset.
    #[error("Not a valid value: {0}, missing time zone information.")]
    MissingTimeZone(String),
}

/// Parses a `start`/`end` style parameter into milliseconds since the epoch.
///
/// Returns `Ok(None)` for an empty parameter.
///
/// # Errors
///
/// Returns [`TimestampError`] if the input is not an integer and not a
/// zoned ISO 8601 datetime.
pub fn parse_timestamp_param(param: &str) -> Result<Option<i64>, TimestampError> {
    let param = param.trim();
    if param.is_empty() {
        return Ok(None);
    }

    if let Ok(ms) = param.parse::<i64>() {
        return Ok(Some(ms));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(param) {
        return Ok(Some(dt.timestamp_millis()));
    }
    for layout in [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(param, layout) {
            return Ok(Some(dt.timestamp_millis()));
        }
    }

    for layout in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if NaiveDateTime::parse_from_str(param, layout).is_ok() {
            return Err(TimestampError::MissingTimeZone(param.to_string()));
        }
    }

    Err(TimestampError::Invalid(param.to_string()))
}

/// Converts a UTC datetime to milliseconds since the epoch.
#[must_use]
pub fn datetime_to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Converts milliseconds since the epoch to a UTC datetime.
///
/// Returns `None` when the value is outside chrono's representable range.
#[must_use]
pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millisecond_integers() {
        assert_eq!(
            parse_timestamp_param("1371816000000").unwrap(),
            Some(1_371_816_000_000)
        );
        assert_eq!(parse_timestamp_param("-1000").unwrap(), Some(-1000));
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(parse_timestamp_param("").unwrap(), None);
        assert_eq!(parse_timestamp_param("  ").unwrap(), None);
    }

    #[test]
    fn parses_zoned_datetimes() {
        assert_eq!(
            parse_timestamp_param("2013-08-29T08:07:44Z").unwrap(),
            Some(1_377_763_664_000)
        );
        assert_eq!(
            parse_timestamp_param("2013-08-29T10:07:44+02:00").unwrap(),
            Some(1_377_763_664_000)
        );
        assert_eq!(
            parse_timestamp_param("2013-08-29T08:07:44.500Z").unwrap(),
            Some(1_377_763_664_500)
        );
    }

    #[test]
    fn rejects_naive_datetime() {
        assert_eq!(
            parse_timestamp_param("2013-08-29T08:07:44"),
            Err(TimestampError::MissingTimeZone(
                "2013-08-29T08:07:44".to_string()
            ))
        );
    }

    #[test]
    fn rejects_garbage_and_impossible_dates() {
        assert!(matches!(
            parse_timestamp_param("2001-01-AA"),
            Err(TimestampError::Invalid(_))
        ));
        assert!(matches!(
            parse_timestamp_param("2001-01-40T10:10:10Z"),
            Err(TimestampError::Invalid(_))
        ));
    }

    #[test]
    fn millis_roundtrip_through_datetime() {
        let dt = millis_to_datetime(1_377_763_664_500).unwrap();
        assert_eq!(datetime_to_millis(&dt), 1_377_763_664_500);
    }
}
