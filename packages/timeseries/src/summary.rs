//! Validation of written events and the series summary they update.
//!
//! Every timeseries keeps the timestamp of its first and last value plus the
//! last value itself, so list views can show them without scanning events.

use dd_node_timeseries_models::{Observation, ObservationValue, ValueType};
use thiserror::Error;

/// Errors raised while validating events for a write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// A value does not fit the series' value type.
    #[error("Invalid value for {value_type} timeseries at {timestamp}: {value}")]
    InvalidValue {
        /// Value type of the target series.
        value_type: ValueType,
        /// Timestamp of the offending event.
        timestamp: i64,
        /// The rejected value, rendered as text.
        value: String,
    },

    /// The series stores arrays, which are not written as events.
    #[error("Events cannot be written to {0} timeseries")]
    UnsupportedValueType(ValueType),
}

/// The stored first/last summary of a series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSummary {
    /// Timestamp of the first value (ms).
    pub start: Option<i64>,
    /// Timestamp of the last value (ms).
    pub end: Option<i64>,
    /// The last value.
    pub last_value: Option<ObservationValue>,
}

impl SeriesSummary {
    /// Folds a batch of written observations into the summary.
    ///
    /// `start` moves when the batch begins earlier. `end` and the last value
    /// move when the batch ends at or after the current end. Returns `None`
    /// when nothing changes.
    #[must_use]
    pub fn apply(&self, written: &[Observation]) -> Option<Self> {
        let first = written.iter().min_by_key(|o| o.timestamp)?;
        let last = written.iter().max_by_key(|o| o.timestamp)?;

        let mut updated = self.clone();
        let mut changed = false;

        if self.start.is_none_or(|start| first.timestamp < start) {
            updated.start = Some(first.timestamp);
            changed = true;
        }

        if self.end.is_none_or(|end| last.timestamp >= end) {
            updated.end = Some(last.timestamp);
            updated.last_value = Some(last.value.clone());
            changed = true;
        }

        changed.then_some(updated)
    }

    /// The last value as reported to clients: `NaN` is reported as absent.
    #[must_use]
    pub fn reported_last_value(&self) -> Option<&ObservationValue> {
        self.last_value.as_ref().filter(|v| !v.is_nan())
    }
}

/// Coerces a written value to the representation stored for `value_type`.
///
/// Numeric series accept numbers and numeric strings (including `0x`/`0b`
/// integer literals). Text series accept any scalar and store it as text.
/// File-like series store a text reference to the file.
///
/// # Errors
///
/// Returns [`WriteError`] when the value cannot be stored in the series.
pub fn coerce_value(
    value_type: ValueType,
    timestamp: i64,
    value: ObservationValue,
) -> Result<ObservationValue, WriteError> {
    match value_type {
        ValueType::Integer | ValueType::Float => match value {
            ObservationValue::Number(_) => Ok(value),
            ObservationValue::Text(text) => parse_numeric(&text)
                .map(ObservationValue::Number)
                .ok_or(WriteError::InvalidValue {
                    value_type,
                    timestamp,
                    value: text,
                }),
        },
        ValueType::Text => Ok(match value {
            ObservationValue::Number(n) => ObservationValue::Text(n.to_string()),
            text @ ObservationValue::Text(_) => text,
        }),
        ValueType::Image | ValueType::Movie | ValueType::File => match value {
            ObservationValue::Text(reference) if !reference.trim().is_empty() => {
                Ok(ObservationValue::Text(reference))
            }
            other => Err(WriteError::InvalidValue {
                value_type,
                timestamp,
                value: match other {
                    ObservationValue::Number(n) => n.to_string(),
                    ObservationValue::Text(t) => t,
                },
            }),
        },
        ValueType::FloatArray => Err(WriteError::UnsupportedValueType(value_type)),
    }
}

/// Parses a numeric literal: decimal, float/scientific, or a signed hex or
/// binary integer.
#[allow(clippy::cast_precision_loss)]
fn parse_numeric(literal: &str) -> Option<f64> {
    let literal = literal.trim();
    let (negative, unsigned) = literal
        .strip_prefix('-')
        .map_or((false, literal), |rest| (true, rest));

    let radix_value = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = unsigned
        .strip_prefix("0b")
        .or_else(|| unsigned.strip_prefix("0B"))
    {
        i64::from_str_radix(bin, 2).ok()
    } else {
        None
    };

    if let Some(v) = radix_value {
        return Some(if negative { -(v as f64) } else { v as f64 });
    }

    literal.parse::<f64>().ok()
}

/// Coerces every event of a write batch.
///
/// # Errors
///
/// Returns the first [`WriteError`] encountered; nothing is written when any
/// event is rejected.
pub fn coerce_batch(
    value_type: ValueType,
    events: Vec<Observation>,
) -> Result<Vec<Observation>, WriteError> {
    events
        .into_iter()
        .map(|o| {
            coerce_value(value_type, o.timestamp, o.value).map(|value| Observation {
                timestamp: o.timestamp,
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_sets_everything() {
        let summary = SeriesSummary::default();
        let updated = summary
            .apply(&[Observation::number(10, 1.0), Observation::number(20, 2.0)])
            .unwrap();
        assert_eq!(updated.start, Some(10));
        assert_eq!(updated.end, Some(20));
        assert_eq!(updated.last_value, Some(ObservationValue::Number(2.0)));
    }

    #[test]
    fn backfill_moves_only_start() {
        let summary = SeriesSummary {
            start: Some(100),
            end: Some(200),
            last_value: Some(ObservationValue::Number(9.0)),
        };
        let updated = summary.apply(&[Observation::number(50, 1.0)]).unwrap();
        assert_eq!(updated.start, Some(50));
        assert_eq!(updated.end, Some(200));
        assert_eq!(updated.last_value, Some(ObservationValue::Number(9.0)));
    }

    #[test]
    fn rewrite_of_last_timestamp_replaces_last_value() {
        let summary = SeriesSummary {
            start: Some(100),
            end: Some(200),
            last_value: Some(ObservationValue::Number(9.0)),
        };
        let updated = summary.apply(&[Observation::number(200, 3.0)]).unwrap();
        assert_eq!(updated.last_value, Some(ObservationValue::Number(3.0)));
    }

    #[test]
    fn write_inside_range_changes_nothing() {
        let summary = SeriesSummary {
            start: Some(100),
            end: Some(200),
            last_value: None,
        };
        assert!(summary.apply(&[Observation::number(150, 1.0)]).is_none());
        assert!(summary.apply(&[]).is_none());
    }

    #[test]
    fn nan_last_value_is_reported_as_absent() {
        let summary = SeriesSummary {
            start: Some(0),
            end: Some(0),
            last_value: Some(ObservationValue::Number(f64::NAN)),
        };
        assert!(summary.reported_last_value().is_none());
    }

    #[test]
    fn numeric_series_accept_numeric_strings() {
        let coerce = |s: &str| coerce_value(ValueType::Float, 0, ObservationValue::Text(s.into()));
        assert_eq!(coerce("1.5"), Ok(ObservationValue::Number(1.5)));
        assert_eq!(coerce("4.08E+02"), Ok(ObservationValue::Number(408.0)));
        assert_eq!(coerce("0x1f"), Ok(ObservationValue::Number(31.0)));
        assert_eq!(coerce("-0b101"), Ok(ObservationValue::Number(-5.0)));
        assert!(matches!(coerce("abc"), Err(WriteError::InvalidValue { .. })));
    }

    #[test]
    fn text_series_store_numbers_as_text() {
        assert_eq!(
            coerce_value(ValueType::Text, 0, ObservationValue::Number(2.5)),
            Ok(ObservationValue::Text("2.5".to_string()))
        );
    }

    #[test]
    fn file_series_store_text_references() {
        assert_eq!(
            coerce_batch(ValueType::Image, vec![Observation::text(0, "scans/0001.png")]),
            Ok(vec![Observation::text(0, "scans/0001.png")])
        );
        assert!(matches!(
            coerce_value(ValueType::File, 5, ObservationValue::Number(1.0)),
            Err(WriteError::InvalidValue { timestamp: 5, .. })
        ));
        assert!(coerce_value(ValueType::Movie, 0, ObservationValue::Text(" ".into())).is_err());
    }

    #[test]
    fn array_series_reject_event_writes() {
        assert_eq!(
            coerce_batch(ValueType::FloatArray, vec![Observation::text(0, "x")]),
            Err(WriteError::UnsupportedValueType(ValueType::FloatArray))
        );
    }
}
