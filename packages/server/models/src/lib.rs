#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the dd-node server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the database row types to allow independent evolution of the API
//! contract. Timestamps are integer milliseconds since the Unix epoch.

pub mod pagination;
pub mod params;

use dd_node_database_models::{
    DomainTableRow, DomainValueRow, LocationRow, NewTimeseries, ObservationTypeRow, SearchRow,
    TimeseriesRow, TimeseriesUpdate,
};
use dd_node_timeseries::summary::SeriesSummary;
use dd_node_timeseries_models::timestamp::{datetime_to_millis, parse_timestamp_param};
use dd_node_timeseries_models::{Event, Observation, ObservationValue, ValueScale, ValueType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::ParamError;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Whether the database answered.
    pub database: bool,
}

fn location_url(uuid: &Uuid) -> String {
    format!("/api/locations/{uuid}")
}

fn timeseries_url(uuid: &Uuid) -> String {
    format!("/api/timeseries/{uuid}")
}

/// Url of the file stored for one event of a file-like series.
#[must_use]
pub fn event_file_url(series: &Uuid, timestamp: i64) -> String {
    format!("/api/timeseries/{series}/data/{timestamp}")
}

/// A location as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLocation {
    /// Relative url of the location.
    pub url: String,
    /// Primary key.
    pub id: i64,
    /// Universally unique identifier.
    pub uuid: Uuid,
    /// Location name.
    pub name: String,
    /// Organisation code.
    pub code: String,
    /// 3D `GeoJSON` geometry.
    pub geometry: Option<serde_json::Value>,
    /// Free-form metadata.
    pub extra_metadata: Option<serde_json::Value>,
    /// Last modification through the API (ms).
    pub last_modified: Option<i64>,
    /// Who last modified the location through the API.
    pub last_modified_by: String,
    /// Optimistic concurrency token to send back with updates.
    pub version: i64,
}

impl From<LocationRow> for ApiLocation {
    fn from(row: LocationRow) -> Self {
        Self {
            url: location_url(&row.uuid),
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            code: row.code,
            geometry: row.geometry,
            extra_metadata: row.extra_metadata,
            last_modified: row.last_modified.as_ref().map(datetime_to_millis),
            last_modified_by: row.last_modified_by,
            version: row.version,
        }
    }
}

/// Request body of `POST /locations`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationCreate {
    /// Organisation code.
    pub code: String,
    /// Location name.
    pub name: String,
    /// `GeoJSON` geometry, 2D or 3D.
    #[serde(default)]
    pub geometry: Option<serde_json::Value>,
    /// Free-form metadata.
    #[serde(default)]
    pub extra_metadata: Option<serde_json::Value>,
}

/// Request body of `PUT`/`PATCH /locations/{uuid}`. Absent fields keep
/// their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationUpdateRequest {
    /// New organisation code.
    pub code: Option<String>,
    /// New location name.
    pub name: Option<String>,
    /// New `GeoJSON` geometry, 2D or 3D.
    pub geometry: Option<serde_json::Value>,
    /// New metadata document.
    pub extra_metadata: Option<serde_json::Value>,
    /// The version the update is based on.
    pub expected_version: Option<i64>,
}

/// Request body of `POST /timeseries`.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeseriesCreate {
    /// Uuid of the owning location.
    pub location: Uuid,
    /// Organisation code, unique within the location.
    pub code: String,
    /// Optional name.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Value type name or code; `float` when absent.
    #[serde(default)]
    pub value_type: Option<serde_json::Value>,
    /// Code of the observation type.
    #[serde(default)]
    pub observation_type: Option<String>,
    /// Measuring device.
    #[serde(default)]
    pub device: String,
    /// Collection interval in seconds.
    #[serde(default)]
    pub interval: Option<i32>,
    /// Free-form metadata.
    #[serde(default)]
    pub extra_metadata: Option<serde_json::Value>,
}

fn parse_value_type(value: &serde_json::Value) -> Result<ValueType, ParamError> {
    let invalid = || ParamError::InvalidValue {
        param: "value_type",
        value: value.to_string(),
    };
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|c| i16::try_from(c).ok())
            .and_then(|c| ValueType::from_code(c).ok())
            .ok_or_else(invalid),
        serde_json::Value::String(s) => ValueType::parse_choice(s).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

impl TimeseriesCreate {
    /// Validates the request into a row to insert.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] for a blank code or an unknown value type.
    pub fn into_new(self) -> Result<NewTimeseries, ParamError> {
        if self.code.trim().is_empty() {
            return Err(ParamError::InvalidValue {
                param: "code",
                value: self.code,
            });
        }
        let value_type = self
            .value_type
            .as_ref()
            .map_or(Ok(ValueType::Float), parse_value_type)?;

        Ok(NewTimeseries {
            location: self.location,
            code: self.code,
            name: self.name,
            description: self.description,
            value_type,
            observation_type: self.observation_type,
            device: self.device,
            interval: self.interval,
            extra_metadata: self.extra_metadata,
            last_modified_by: String::new(),
        })
    }
}

/// Request body of `PUT`/`PATCH /timeseries/{uuid}`. Absent fields keep
/// their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeseriesUpdateRequest {
    /// New organisation code.
    pub code: Option<String>,
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Value type; only accepted when unchanged.
    pub value_type: Option<serde_json::Value>,
    /// Code of the new observation type.
    pub observation_type: Option<String>,
    /// New measuring device.
    pub device: Option<String>,
    /// New collection interval in seconds.
    pub interval: Option<i32>,
    /// New metadata document.
    pub extra_metadata: Option<serde_json::Value>,
    /// The version the update is based on.
    pub expected_version: Option<i64>,
}

impl TimeseriesUpdateRequest {
    /// Validates the request against the stored series and returns the
    /// changes plus the expected version.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] for a blank code or a value type other than
    /// the stored one.
    pub fn into_update(
        self,
        current: ValueType,
    ) -> Result<(TimeseriesUpdate, Option<i64>), ParamError> {
        if let Some(value_type) = &self.value_type {
            if parse_value_type(value_type)? != current {
                return Err(ParamError::InvalidValue {
                    param: "value_type",
                    value: value_type.to_string(),
                });
            }
        }
        if let Some(code) = self.code.as_ref().filter(|c| c.trim().is_empty()) {
            return Err(ParamError::InvalidValue {
                param: "code",
                value: code.clone(),
            });
        }

        Ok((
            TimeseriesUpdate {
                code: self.code,
                name: self.name,
                description: self.description,
                observation_type: self.observation_type,
                device: self.device,
                interval: self.interval,
                extra_metadata: self.extra_metadata,
                last_modified_by: String::new(),
            },
            self.expected_version,
        ))
    }
}

/// The location a timeseries belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLocationRef {
    /// Relative url of the location.
    pub url: String,
    /// Universally unique identifier.
    pub uuid: Uuid,
    /// Location name.
    pub name: String,
}

/// An observation type as embedded in a timeseries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiObservationType {
    /// Unique code.
    pub code: String,
    /// Parameter name.
    pub parameter: String,
    /// Unit name.
    pub unit: String,
    /// Unit followed by the reference frame.
    pub referenced_unit: String,
    /// Reference frame name.
    pub reference_frame: Option<String>,
    /// Compartment name.
    pub compartment: Option<String>,
    /// Free-form description.
    pub description: String,
    /// Level of measurement.
    pub scale: ValueScale,
}

impl From<ObservationTypeRow> for ApiObservationType {
    fn from(row: ObservationTypeRow) -> Self {
        Self {
            referenced_unit: row.referenced_unit(),
            code: row.code,
            parameter: row.parameter,
            unit: row.unit,
            reference_frame: row.reference_frame,
            compartment: row.compartment,
            description: row.description,
            scale: row.scale,
        }
    }
}

/// One event as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApiEvent {
    /// A value event of a numeric or text series.
    Value(Event),
    /// A file event, pointing at the stored file.
    File {
        /// Timestamp (ms).
        timestamp: i64,
        /// Relative url of the file.
        url: String,
    },
}

impl ApiEvent {
    /// Shapes resolved events for `series`.
    ///
    /// Events of file-like series become file references; those without a
    /// timestamp have nothing to point at and are dropped.
    #[must_use]
    pub fn shape(series: &Uuid, value_type: ValueType, events: Vec<Event>) -> Vec<Self> {
        if value_type.is_file() {
            events
                .into_iter()
                .filter_map(|e| e.timestamp)
                .map(|timestamp| Self::File {
                    timestamp,
                    url: event_file_url(series, timestamp),
                })
                .collect()
        } else {
            events.into_iter().map(Self::Value).collect()
        }
    }
}

/// A timeseries as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTimeseries {
    /// Relative url of the timeseries.
    pub url: String,
    /// Primary key.
    pub id: i64,
    /// Universally unique identifier.
    pub uuid: Uuid,
    /// Optional name.
    pub name: Option<String>,
    /// Organisation code.
    pub code: String,
    /// Optional description.
    pub description: Option<String>,
    /// Kind of values stored.
    pub value_type: ValueType,
    /// Collection interval in seconds.
    pub interval: Option<i32>,
    /// The owning location.
    pub location: ApiLocationRef,
    /// Observation type, if assigned.
    pub observation_type: Option<ApiObservationType>,
    /// Data source name.
    pub datasource: Option<String>,
    /// Timeseries type name.
    pub timeseries_type: Option<String>,
    /// Measuring device.
    pub device: String,
    /// Free-form metadata.
    pub extra_metadata: Option<serde_json::Value>,
    /// Timestamp of the first value (ms).
    pub start: Option<i64>,
    /// Timestamp of the last value (ms).
    pub end: Option<i64>,
    /// The last value; a file url for file-like series.
    pub last_value: Option<ObservationValue>,
    /// Optimistic concurrency token to send back with writes.
    pub version: i64,
    /// Last modification through the API (ms).
    pub last_modified: Option<i64>,
    /// Events in the requested window; `null` unless both `start` and `end`
    /// were requested.
    pub events: Option<Vec<ApiEvent>>,
}

impl ApiTimeseries {
    /// Converts a row, embedding `events` when they were requested.
    #[must_use]
    pub fn new(row: TimeseriesRow, events: Option<Vec<Event>>) -> Self {
        let summary = SeriesSummary {
            start: row.start,
            end: row.end,
            last_value: row.last_value(),
        };
        let last_value = if row.value_type.is_file() {
            row.end
                .map(|end| ObservationValue::Text(event_file_url(&row.uuid, end)))
        } else {
            summary.reported_last_value().cloned()
        };

        Self {
            url: timeseries_url(&row.uuid),
            events: events.map(|e| ApiEvent::shape(&row.uuid, row.value_type, e)),
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            code: row.code,
            description: row.description,
            value_type: row.value_type,
            interval: row.interval,
            location: ApiLocationRef {
                url: location_url(&row.location_uuid),
                uuid: row.location_uuid,
                name: row.location_name,
            },
            observation_type: row.observation_type.map(Into::into),
            datasource: row.datasource,
            timeseries_type: row.timeseries_type,
            device: row.device,
            extra_metadata: row.extra_metadata,
            start: summary.start,
            end: summary.end,
            last_value,
            version: row.version,
            last_modified: row.last_modified.as_ref().map(datetime_to_millis),
        }
    }
}

/// The events of one series in a multi-series response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiSeriesEvents {
    /// Series uuid.
    pub uuid: Uuid,
    /// Resolved events.
    pub events: Vec<ApiEvent>,
}

/// The timestamp of a written event: ms since the epoch or a zoned
/// datetime string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EventTimestamp {
    /// Milliseconds since the epoch.
    Millis(i64),
    /// ISO 8601 datetime with a time zone, or a numeric string.
    Text(String),
}

/// One event of a write request.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    /// When the value was observed. `datetime` is accepted as an alias.
    #[serde(alias = "datetime")]
    pub timestamp: EventTimestamp,
    /// The observed value: a number or a string.
    pub value: serde_json::Value,
}

impl EventInput {
    /// Converts the event into an observation, before value type coercion.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] when the timestamp cannot be parsed or the
    /// value is neither a number nor a string.
    pub fn to_observation(&self) -> Result<Observation, ParamError> {
        let timestamp = match &self.timestamp {
            EventTimestamp::Millis(ms) => *ms,
            EventTimestamp::Text(text) => parse_timestamp_param(text)
                .map_err(|source| ParamError::Timestamp {
                    param: "timestamp",
                    source,
                })?
                .ok_or_else(|| ParamError::InvalidValue {
                    param: "timestamp",
                    value: text.clone(),
                })?,
        };

        let value = match &self.value {
            serde_json::Value::Number(n) => {
                n.as_f64()
                    .map(ObservationValue::Number)
                    .ok_or_else(|| ParamError::InvalidValue {
                        param: "value",
                        value: n.to_string(),
                    })?
            }
            serde_json::Value::String(s) => ObservationValue::Text(s.clone()),
            other => {
                return Err(ParamError::InvalidValue {
                    param: "value",
                    value: other.to_string(),
                });
            }
        };

        Ok(Observation { timestamp, value })
    }
}

/// Request body of `POST /timeseries/{uuid}/data`: either a bare event
/// array or an object carrying the optimistic concurrency token.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WriteRequest {
    /// Unconditional write.
    Events(Vec<EventInput>),
    /// Write guarded by the series version the client last saw.
    Versioned {
        /// Events to write.
        events: Vec<EventInput>,
        /// The version the write is based on.
        #[serde(default)]
        expected_version: Option<i64>,
    },
}

impl WriteRequest {
    /// The events as observations plus the expected version, if any.
    ///
    /// # Errors
    ///
    /// Returns the first [`ParamError`] raised by an event.
    pub fn into_parts(self) -> Result<(Vec<Observation>, Option<i64>), ParamError> {
        let (events, expected_version) = match self {
            Self::Events(events) => (events, None),
            Self::Versioned {
                events,
                expected_version,
            } => (events, expected_version),
        };
        let observations = events
            .iter()
            .map(EventInput::to_observation)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((observations, expected_version))
    }
}

/// Response of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Number of events stored.
    pub written: u64,
    /// The series version after the write.
    pub version: i64,
}

/// A table of a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDomainTable {
    /// Relative url of the table's values.
    pub url: String,
    /// Table name.
    pub name: String,
    /// Url of the REST API the table syncs from.
    pub rest_sync_url: Option<String>,
    /// Latest sync (ms).
    pub last_synced: Option<i64>,
}

impl ApiDomainTable {
    /// Converts a row of the domain named `domain`.
    #[must_use]
    pub fn new(domain: &str, row: DomainTableRow) -> Self {
        Self {
            url: format!("/api/domains/{domain}/tables/{}/values", row.name),
            last_synced: row.last_synced.as_ref().map(datetime_to_millis),
            name: row.name,
            rest_sync_url: row.rest_sync_url,
        }
    }
}

/// A value of a domain table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDomainValue {
    /// Code within the domain.
    pub code: String,
    /// Human readable description.
    pub description: String,
    /// Start of validity (ms).
    pub begin_date: Option<i64>,
    /// End of validity (ms).
    pub end_date: Option<i64>,
    /// Category of the value.
    pub value_category: Option<String>,
}

impl From<DomainValueRow> for ApiDomainValue {
    fn from(row: DomainValueRow) -> Self {
        Self {
            code: row.code,
            description: row.description,
            begin_date: row.begin_date.as_ref().map(datetime_to_millis),
            end_date: row.end_date.as_ref().map(datetime_to_millis),
            value_category: row.value_category,
        }
    }
}

/// A search hit as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct ApiSearchResult {
    /// `<kind>.<entity id>`.
    pub id: String,
    /// Name, code or id of the entity.
    pub title: String,
    /// Description or code of the entity.
    pub description: String,
    /// `2` for a title match, `1` for a description match, `null` when
    /// listing without a query.
    pub rank: Option<i32>,
    /// Kind of the entity.
    pub entity_name: String,
    /// Primary key of the entity.
    pub entity_id: i64,
    /// Uuid of the entity, when it has one.
    pub entity_uuid: Option<Uuid>,
    /// Relative url of the entity.
    pub entity_url: String,
    /// `[lat, lng, zoom]` at which the entity is best viewed.
    pub view: [Option<f64>; 3],
}

impl From<SearchRow> for ApiSearchResult {
    fn from(row: SearchRow) -> Self {
        Self {
            id: format!("{}.{}", row.kind, row.entity_id),
            entity_url: row.url(),
            entity_name: row.kind.to_string(),
            title: row.title,
            description: row.description,
            rank: row.rank,
            entity_id: row.entity_id,
            entity_uuid: row.entity_uuid,
            view: [row.y, row.x, None],
        }
    }
}
