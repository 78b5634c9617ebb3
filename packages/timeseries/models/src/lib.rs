#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Observation, window and event types for dd-node timeseries.
//!
//! These types are shared by the event resolver, the database layer and the
//! HTTP API. All timestamps are integer milliseconds since the Unix epoch
//! (UTC).

pub mod timestamp;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The value recorded by a single observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    /// Numeric measurement (integer and float series).
    Number(f64),
    /// Free-form text (text series, file references).
    Text(String),
}

impl ObservationValue {
    /// Whether this is a numeric `NaN`, which is treated as "no value".
    #[must_use]
    pub const fn is_nan(&self) -> bool {
        matches!(self, Self::Number(v) if v.is_nan())
    }

    /// Returns the numeric value, if any.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

/// A single timestamped measurement of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Recorded value.
    pub value: ObservationValue,
}

impl Observation {
    /// Creates a numeric observation.
    #[must_use]
    pub const fn number(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value: ObservationValue::Number(value),
        }
    }

    /// Creates a text observation.
    #[must_use]
    pub fn text(timestamp: i64, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: ObservationValue::Text(value.into()),
        }
    }
}

/// The kind of values stored in a timeseries.
///
/// Stored in the database as the numeric code; exposed over the API by name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueType {
    /// Integer measurements.
    Integer = 0,
    /// Floating point measurements.
    Float = 1,
    /// Text values.
    Text = 4,
    /// Image files.
    Image = 5,
    /// Movie files.
    Movie = 8,
    /// Arbitrary files.
    File = 10,
    /// Arrays of floats, one per location sub-point.
    #[serde(rename = "float array")]
    #[strum(to_string = "float array")]
    FloatArray = 12,
}

impl ValueType {
    /// Returns the numeric code stored in the database.
    #[must_use]
    pub const fn code(self) -> i16 {
        self as i16
    }

    /// Creates a value type from its numeric code.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidChoiceError`] for unknown codes.
    pub fn from_code(code: i16) -> Result<Self, InvalidChoiceError> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or_else(|| InvalidChoiceError::new(code.to_string()))
    }

    /// Parses either the numeric code (`"1"`) or the display name
    /// (`"float"`).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidChoiceError`] if neither form matches.
    pub fn parse_choice(s: &str) -> Result<Self, InvalidChoiceError> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i16>() {
            return Self::from_code(code);
        }
        s.parse().map_err(|_| InvalidChoiceError::new(s))
    }

    /// Integer and float series support aggregation.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Image, movie and file series store a file per timestamp.
    #[must_use]
    pub const fn is_file(self) -> bool {
        matches!(self, Self::Image | Self::Movie | Self::File)
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Integer,
            Self::Float,
            Self::Text,
            Self::Image,
            Self::Movie,
            Self::File,
            Self::FloatArray,
        ]
    }
}

/// Level of measurement of an observation type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueScale {
    /// Unordered categories.
    Nominal = 0,
    /// Ordered categories.
    Ordinal = 1,
    /// Differences are meaningful, no true zero.
    Interval = 2,
    /// Differences and ratios are meaningful.
    Ratio = 3,
}

impl ValueScale {
    /// Returns the numeric code stored in the database.
    #[must_use]
    pub const fn code(self) -> i16 {
        self as i16
    }

    /// Creates a scale from its numeric code.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidChoiceError`] for unknown codes.
    pub fn from_code(code: i16) -> Result<Self, InvalidChoiceError> {
        match code {
            0 => Ok(Self::Nominal),
            1 => Ok(Self::Ordinal),
            2 => Ok(Self::Interval),
            3 => Ok(Self::Ratio),
            _ => Err(InvalidChoiceError::new(code.to_string())),
        }
    }

    /// Display name of the scale.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::Ordinal => "ordinal",
            Self::Interval => "interval",
            Self::Ratio => "ratio",
        }
    }
}

/// Error returned when a choice field receives an unknown code or name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown choice {value}")]
pub struct InvalidChoiceError {
    /// The rejected input.
    pub value: String,
}

impl InvalidChoiceError {
    fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Temporal aggregation granularity.
///
/// `five_minute` is also accepted as `5min`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AggregationWindow {
    /// No aggregation.
    Raw,
    /// One-second buckets.
    Second,
    /// One-minute buckets.
    Minute,
    /// Five-minute buckets.
    #[serde(alias = "5min")]
    #[strum(to_string = "five_minute", serialize = "5min")]
    FiveMinute,
    /// One-hour buckets.
    Hour,
    /// One-day buckets (UTC).
    Day,
    /// Seven-day buckets aligned to the Unix epoch.
    Week,
    /// Calendar months (UTC).
    Month,
    /// Calendar years (UTC).
    Year,
}

impl AggregationWindow {
    /// Bucketing granularities from finest to coarsest, excluding `raw`.
    pub const LADDER: [Self; 8] = [
        Self::Second,
        Self::Minute,
        Self::FiveMinute,
        Self::Hour,
        Self::Day,
        Self::Week,
        Self::Month,
        Self::Year,
    ];

    /// Whether this is the pass-through granularity.
    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(self, Self::Raw)
    }
}

/// A requested time range. A missing bound is unbounded in that direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound (ms).
    pub start: Option<i64>,
    /// Upper bound (ms).
    pub end: Option<i64>,
}

impl TimeWindow {
    /// Creates a window from optional bounds.
    #[must_use]
    pub const fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// Creates a window bounded on both sides.
    #[must_use]
    pub const fn between(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Whether the start lies after the end.
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start > end,
            _ => false,
        }
    }

    /// Whether both bounds are absent. Such a window requests no events.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether both bounds are present.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Whether `timestamp` lies in the half-open window `[start, end)`.
    #[must_use]
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.is_none_or(|start| timestamp >= start)
            && self.end.is_none_or(|end| timestamp < end)
    }
}

/// A field of an [`Event`] that a client can select with `fields=`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventField {
    /// Event timestamp (ms).
    Timestamp,
    /// Event value.
    Value,
}

impl EventField {
    /// Parses a comma-separated field list. Blank entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidChoiceError`] naming the first unknown field.
    pub fn parse_list(s: &str) -> Result<BTreeSet<Self>, InvalidChoiceError> {
        s.split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| f.parse().map_err(|_| InvalidChoiceError::new(f)))
            .collect()
    }
}

/// A client-visible event produced from one observation or one bucket.
///
/// Fields that were projected away are omitted from the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Timestamp (ms): the observation time, or the bucket start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Value: the observation value, or the last value in the bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ObservationValue>,
}

impl Event {
    /// Creates an event carrying both fields.
    #[must_use]
    pub const fn new(timestamp: i64, value: ObservationValue) -> Self {
        Self {
            timestamp: Some(timestamp),
            value: Some(value),
        }
    }

    /// Keeps only the selected fields.
    #[must_use]
    pub fn project(self, fields: &BTreeSet<EventField>) -> Self {
        Self {
            timestamp: self
                .timestamp
                .filter(|_| fields.contains(&EventField::Timestamp)),
            value: self.value.filter(|_| fields.contains(&EventField::Value)),
        }
    }
}

impl From<&Observation> for Event {
    fn from(observation: &Observation) -> Self {
        Self::new(observation.timestamp, observation.value.clone())
    }
}
