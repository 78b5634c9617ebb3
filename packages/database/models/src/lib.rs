#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database row types and query parameter definitions.
//!
//! These types represent the shapes of data as stored in and retrieved from
//! the `PostGIS` database. They are distinct from the API response types in
//! `dd_node_server_models`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use dd_node_timeseries_models::{ObservationValue, ValueScale, ValueType};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }
}

/// A window into a result set. `limit = None` returns every row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Maximum number of rows to return.
    pub limit: Option<u64>,
    /// Number of rows to skip.
    pub offset: u64,
}

impl Page {
    /// A page covering the whole result set.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            limit: None,
            offset: 0,
        }
    }
}

/// One page of rows together with the size of the full result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    /// Total number of matching rows.
    pub count: u64,
    /// The rows of the requested page.
    pub rows: Vec<T>,
}

/// A sort key with direction, parsed from `field` or `-field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering<F> {
    /// Column to sort by.
    pub field: F,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl<F: FromStr> FromStr for Ordering<F> {
    type Err = F::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, name) = s.strip_prefix('-').map_or((false, s), |rest| (true, rest));
        Ok(Self {
            field: name.parse()?,
            descending,
        })
    }
}

impl<F> Ordering<F> {
    /// SQL direction keyword.
    #[must_use]
    pub const fn direction(&self) -> &'static str {
        if self.descending { "DESC" } else { "ASC" }
    }
}

/// Sortable location columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LocationOrderField {
    /// Location name.
    Name,
    /// Organisation code.
    Code,
    /// Universally unique identifier.
    Uuid,
    /// Last modification through the API.
    LastModified,
}

impl LocationOrderField {
    /// The column expression to sort by.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Name => "l.name",
            Self::Code => "l.code",
            Self::Uuid => "l.uuid",
            Self::LastModified => "l.last_modified",
        }
    }
}

/// Sortable timeseries columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TimeseriesOrderField {
    /// Timeseries name.
    Name,
    /// Organisation code.
    Code,
    /// Universally unique identifier.
    Uuid,
    /// Timestamp of the first value.
    Start,
    /// Timestamp of the last value.
    End,
    /// Value type code.
    ValueType,
}

impl TimeseriesOrderField {
    /// The column expression to sort by.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Name => "t.name",
            Self::Code => "t.code",
            Self::Uuid => "t.uuid",
            Self::Start => "t.start_ms",
            Self::End => "t.end_ms",
            Self::ValueType => "t.value_type",
        }
    }
}

/// Parameters for listing locations.
#[derive(Debug, Clone, Default)]
pub struct LocationQuery {
    /// Spatial bounding box filter (overlapping geometries are included).
    pub bbox: Option<BoundingBox>,
    /// Case-insensitive partial name match.
    pub name: Option<String>,
    /// Exact organisation code.
    pub code: Option<String>,
    /// Restrict to these uuids. An empty list matches nothing.
    pub uuid: Option<Vec<Uuid>>,
    /// `Some(true)` for locations without geometry, `Some(false)` for those
    /// with one.
    pub geom_isnull: Option<bool>,
    /// Sort order; defaults to ascending name.
    pub ordering: Option<Ordering<LocationOrderField>>,
    /// Result window.
    pub page: Page,
}

/// Parameters for listing timeseries.
#[derive(Debug, Clone, Default)]
pub struct TimeseriesQuery {
    /// Case-insensitive partial name match.
    pub name: Option<String>,
    /// Exact organisation code.
    pub code: Option<String>,
    /// Restrict to these uuids. An empty list matches nothing.
    pub uuid: Option<Vec<Uuid>>,
    /// Uuid of the owning location.
    pub location: Option<Uuid>,
    /// Restrict to one value type.
    pub value_type: Option<ValueType>,
    /// Case-insensitive partial match on name, code or description.
    pub search: Option<String>,
    /// Sort order; defaults to ascending name.
    pub ordering: Option<Ordering<TimeseriesOrderField>>,
    /// Result window.
    pub page: Page,
}

/// A location row as retrieved from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
    /// Primary key.
    pub id: i64,
    /// Universally unique identifier.
    pub uuid: Uuid,
    /// Organisation code.
    pub code: String,
    /// Location name.
    pub name: String,
    /// `GeoJSON` geometry (3D).
    pub geometry: Option<serde_json::Value>,
    /// Free-form metadata.
    pub extra_metadata: Option<serde_json::Value>,
    /// Last modification through the API.
    pub last_modified: Option<DateTime<Utc>>,
    /// Who last modified the location through the API.
    pub last_modified_by: String,
    /// Optimistic concurrency token, bumped by every update.
    pub version: i64,
}

/// A location to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    /// Organisation code.
    pub code: String,
    /// Location name.
    pub name: String,
    /// `GeoJSON` geometry, already coerced to 3D.
    pub geometry: Option<serde_json::Value>,
    /// Free-form metadata.
    pub extra_metadata: Option<serde_json::Value>,
    /// Who created the location.
    pub last_modified_by: String,
}

/// Changes to a stored location. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationUpdate {
    /// New organisation code.
    pub code: Option<String>,
    /// New name.
    pub name: Option<String>,
    /// New `GeoJSON` geometry, already coerced to 3D.
    pub geometry: Option<serde_json::Value>,
    /// New metadata document.
    pub extra_metadata: Option<serde_json::Value>,
    /// Who made the change.
    pub last_modified_by: String,
}

/// The observation type (parameter-referenced unit) of a timeseries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationTypeRow {
    /// Primary key.
    pub id: i64,
    /// Unique code.
    pub code: String,
    /// Short parameter name.
    pub parameter: String,
    /// Short unit name.
    pub unit: String,
    /// Short reference frame name.
    pub reference_frame: Option<String>,
    /// Short compartment name.
    pub compartment: Option<String>,
    /// Free-form description.
    pub description: String,
    /// Level of measurement.
    pub scale: ValueScale,
}

impl ObservationTypeRow {
    /// Unit followed by the reference frame, when there is one.
    #[must_use]
    pub fn referenced_unit(&self) -> String {
        format!(
            "{}{}",
            self.unit,
            self.reference_frame.as_deref().unwrap_or_default()
        )
    }
}

/// A timeseries row joined with its location and observation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesRow {
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
    /// Uuid of the owning location.
    pub location_uuid: Uuid,
    /// Name of the owning location.
    pub location_name: String,
    /// Observation type, if assigned.
    pub observation_type: Option<ObservationTypeRow>,
    /// Name of the data source, if assigned.
    pub datasource: Option<String>,
    /// Name of the timeseries type, if assigned.
    pub timeseries_type: Option<String>,
    /// Measuring device.
    pub device: String,
    /// Collection interval in seconds.
    pub interval: Option<i32>,
    /// Timestamp of the first value (ms).
    pub start: Option<i64>,
    /// Timestamp of the last value (ms).
    pub end: Option<i64>,
    /// Last value of a numeric series.
    pub last_value_decimal: Option<f64>,
    /// Last value of a non-numeric series.
    pub last_value_text: Option<String>,
    /// Optimistic concurrency token, bumped by every write.
    pub version: i64,
    /// Free-form metadata.
    pub extra_metadata: Option<serde_json::Value>,
    /// Last modification through the API.
    pub last_modified: Option<DateTime<Utc>>,
}

impl TimeseriesRow {
    /// The stored last value, read from the column matching the value type.
    #[must_use]
    pub fn last_value(&self) -> Option<ObservationValue> {
        if self.value_type.is_numeric() {
            self.last_value_decimal.map(ObservationValue::Number)
        } else {
            self.last_value_text.clone().map(ObservationValue::Text)
        }
    }
}

/// A timeseries to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTimeseries {
    /// Uuid of the owning location.
    pub location: Uuid,
    /// Organisation code, unique within the location.
    pub code: String,
    /// Optional name.
    pub name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Kind of values the series stores.
    pub value_type: ValueType,
    /// Code of the observation type.
    pub observation_type: Option<String>,
    /// Measuring device.
    pub device: String,
    /// Collection interval in seconds.
    pub interval: Option<i32>,
    /// Free-form metadata.
    pub extra_metadata: Option<serde_json::Value>,
    /// Who created the series.
    pub last_modified_by: String,
}

/// Changes to a stored timeseries. `None` keeps the current value; the
/// value type cannot change once events may exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeseriesUpdate {
    /// New organisation code.
    pub code: Option<String>,
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Code of the new observation type.
    pub observation_type: Option<String>,
    /// New measuring device.
    pub device: Option<String>,
    /// New collection interval in seconds.
    pub interval: Option<i32>,
    /// New metadata document.
    pub extra_metadata: Option<serde_json::Value>,
    /// Who made the change.
    pub last_modified_by: String,
}

/// A domain table nested under a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTableRow {
    /// Table name.
    pub name: String,
    /// Url of the REST API the table syncs from.
    pub rest_sync_url: Option<String>,
    /// Timestamp of the latest sync.
    pub last_synced: Option<DateTime<Utc>>,
}

/// A value of a domain table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainValueRow {
    /// Code within the domain.
    pub code: String,
    /// Human readable description.
    pub description: String,
    /// Start of validity.
    pub begin_date: Option<DateTime<Utc>>,
    /// End of validity.
    pub end_date: Option<DateTime<Utc>>,
    /// Optional category of the value.
    pub value_category: Option<String>,
}

/// How a reference table column is decoded into JSON.
#[derive(Debug, Clone, Copy)]
pub enum ColumnKind {
    /// Text column.
    Text,
    /// Integer column (`SMALLINT`, `INTEGER` or `BIGINT`).
    Integer,
    /// Boolean column.
    Bool,
    /// Uuid column, selected as text.
    Uuid,
    /// Timestamp column, rendered as milliseconds since the epoch.
    Timestamp,
    /// Integer code rendered through a choice list, e.g. a value scale.
    Choice(fn(i64) -> Option<&'static str>),
}

/// A column exposed by a reference table.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceColumn {
    /// Column name, used as the JSON key.
    pub name: &'static str,
    /// Decoding of the column.
    pub kind: ColumnKind,
}

impl ReferenceColumn {
    /// Creates a column description.
    #[must_use]
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// A reference table served by the generic list and detail handlers.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceTable {
    /// Table name.
    pub table: &'static str,
    /// Column used by the detail lookup.
    pub lookup: ReferenceColumn,
    /// Whether the lookup ignores case.
    pub lookup_ignores_case: bool,
    /// `ORDER BY` column.
    pub order_by: &'static str,
    /// Columns returned for each row.
    pub columns: &'static [ReferenceColumn],
    /// Columns searched by the `search` filter.
    pub search_columns: &'static [&'static str],
}

/// Kinds of entities returned by search.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SearchKind {
    /// A location.
    Location,
    /// A timeseries.
    Timeseries,
    /// An observation type.
    #[strum(to_string = "observationtype", serialize = "observation_type")]
    #[serde(rename = "observationtype")]
    ObservationType,
}

impl SearchKind {
    /// All searchable kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Location, Self::Timeseries, Self::ObservationType]
    }

    /// Path segment of the entity's API endpoint.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Location => "locations",
            Self::Timeseries => "timeseries",
            Self::ObservationType => "observationtypes",
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    /// Kind of the matched entity.
    pub kind: SearchKind,
    /// Primary key of the matched entity.
    pub entity_id: i64,
    /// Uuid of the matched entity, when it has one.
    pub entity_uuid: Option<Uuid>,
    /// Name, code or id.
    pub title: String,
    /// Description or code.
    pub description: String,
    /// `2` for a title match, `1` for a description match; `None` when
    /// listing without a query.
    pub rank: Option<i32>,
    /// Longitude of the entity's centroid, when it has a geometry.
    pub x: Option<f64>,
    /// Latitude of the entity's centroid, when it has a geometry.
    pub y: Option<f64>,
}

impl SearchRow {
    /// Relative API url of the matched entity.
    #[must_use]
    pub fn url(&self) -> String {
        let key = self
            .entity_uuid
            .map_or_else(|| self.entity_id.to_string(), |u| u.to_string());
        format!("/api/{}/{key}", self.kind.endpoint())
    }
}

/// Parameters for a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Search terms, matched case-insensitively as a substring.
    pub q: Option<String>,
    /// Kinds to search; all kinds when empty.
    pub kinds: Vec<SearchKind>,
    /// Drop hits whose url contains `/<exclude>`.
    pub exclude: Vec<String>,
}
