//! Query parameters of the list, data and search endpoints.
//!
//! Every parameter arrives as a raw string and is validated here, so that
//! malformed values map onto the API's error codes instead of a generic
//! query deserialization failure.

use std::str::FromStr;

use dd_node_database_models::{
    BoundingBox, LocationOrderField, LocationQuery, Ordering, Page, SearchKind, SearchQuery,
    TimeseriesOrderField, TimeseriesQuery,
};
use dd_node_spatial::{GeometryError, parse_bounding_box};
use dd_node_timeseries::EventQuery;
use dd_node_timeseries_models::timestamp::{TimestampError, parse_timestamp_param};
use dd_node_timeseries_models::{AggregationWindow, EventField, TimeWindow, ValueType};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::pagination::PaginationParams;

/// Errors produced while parsing query parameters.
#[derive(Debug, Error)]
pub enum ParamError {
    /// A parameter has a value of the wrong shape.
    #[error("Invalid value for {param}: {value}")]
    InvalidValue {
        /// The offending parameter.
        param: &'static str,
        /// Its raw value.
        value: String,
    },

    /// A `start`/`end` style parameter is not a timestamp.
    #[error("{param}: {source}")]
    Timestamp {
        /// The offending parameter.
        param: &'static str,
        /// Why the value was rejected.
        source: TimestampError,
    },

    /// An `in_bbox` filter that is not four numbers.
    #[error(transparent)]
    BoundingBox(#[from] GeometryError),

    /// A multi-series request without valid uuids or without both bounds.
    #[error("Invalid request parameters.")]
    IncompleteSeriesRequest,
}

impl ParamError {
    fn invalid(param: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            param,
            value: value.to_string(),
        }
    }
}

/// Splits a comma separated parameter, dropping blank entries.
pub fn split_list(param: &str) -> impl Iterator<Item = &str> {
    param.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parses a comma separated uuid list. Entries that are not uuids are
/// dropped, so a list without any valid uuid matches nothing.
#[must_use]
pub fn parse_uuid_list(param: &str) -> Vec<Uuid> {
    split_list(param)
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect()
}

fn parse_bool(param: &'static str, value: &str) -> Result<bool, ParamError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ParamError::invalid(param, value)),
    }
}

fn parse_ordering<F: FromStr>(value: &str) -> Result<Ordering<F>, ParamError> {
    value
        .parse()
        .map_err(|_| ParamError::invalid("ordering", value))
}

fn parse_timestamp(param: &'static str, value: &str) -> Result<Option<i64>, ParamError> {
    parse_timestamp_param(value).map_err(|source| ParamError::Timestamp { param, source })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Query parameters of `GET /locations`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationListParams {
    /// `min_x,min_y,max_x,max_y`; overlapping geometries are included.
    pub in_bbox: Option<String>,
    /// Case-insensitive partial name match.
    pub name: Option<String>,
    /// Exact code.
    pub code: Option<String>,
    /// Comma separated uuids.
    pub uuid: Option<String>,
    /// `true` or `false`.
    pub geom_isnull: Option<String>,
    /// Sort field, `-` prefixed for descending order.
    pub ordering: Option<String>,
    /// Pagination.
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

impl LocationListParams {
    /// Builds the database query for one page.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] for a malformed filter value.
    pub fn to_query(&self, page: Page) -> Result<LocationQuery, ParamError> {
        let bbox = self
            .in_bbox
            .as_deref()
            .map(parse_bounding_box)
            .transpose()?
            .map(|rect| {
                let (min, max) = (rect.min(), rect.max());
                BoundingBox::new(min.x, min.y, max.x, max.y)
            });

        Ok(LocationQuery {
            bbox,
            name: non_empty(self.name.as_ref()),
            code: non_empty(self.code.as_ref()),
            uuid: self.uuid.as_deref().map(parse_uuid_list),
            geom_isnull: self
                .geom_isnull
                .as_deref()
                .map(|v| parse_bool("geom_isnull", v))
                .transpose()?,
            ordering: self
                .ordering
                .as_deref()
                .map(parse_ordering::<LocationOrderField>)
                .transpose()?,
            page,
        })
    }
}

/// Windowing parameters shared by every endpoint that returns events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventParams {
    /// Start of the window: ms since the epoch or a zoned datetime.
    pub start: Option<String>,
    /// End of the window: ms since the epoch or a zoned datetime.
    pub end: Option<String>,
    /// Aggregation window name.
    pub window: Option<String>,
    /// Minimum number of events wanted.
    pub min_points: Option<String>,
    /// Comma separated event fields.
    pub fields: Option<String>,
}

impl EventParams {
    /// The query for events embedded in list and detail views: `None`
    /// unless both bounds hold a timestamp. Blank bounds count as absent.
    ///
    /// # Errors
    ///
    /// See [`Self::to_event_query`].
    pub fn embedded_query(&self) -> Result<Option<EventQuery>, ParamError> {
        let query = self.to_event_query()?;
        Ok(query.window.is_bounded().then_some(query))
    }

    /// The query of a data endpoint: `None` when neither bound holds a
    /// timestamp, which requests no events.
    ///
    /// # Errors
    ///
    /// See [`Self::to_event_query`].
    pub fn data_query(&self) -> Result<Option<EventQuery>, ParamError> {
        let query = self.to_event_query()?;
        Ok((!query.window.is_unbounded()).then_some(query))
    }

    /// Parses the parameters into a resolver query.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] for malformed timestamps, an unknown window or
    /// field name, or a `min_points` that is not a non-negative integer.
    pub fn to_event_query(&self) -> Result<EventQuery, ParamError> {
        let start = self
            .start
            .as_deref()
            .map(|s| parse_timestamp("start", s))
            .transpose()?
            .flatten();
        let end = self
            .end
            .as_deref()
            .map(|s| parse_timestamp("end", s))
            .transpose()?
            .flatten();

        let aggregation = non_empty(self.window.as_ref())
            .map(|w| {
                w.parse::<AggregationWindow>()
                    .map_err(|_| ParamError::invalid("window", &w))
            })
            .transpose()?;

        let min_points = non_empty(self.min_points.as_ref())
            .map(|p| {
                p.parse::<u64>()
                    .map_err(|_| ParamError::invalid("min_points", &p))
            })
            .transpose()?;

        let fields = non_empty(self.fields.as_ref())
            .map(|f| {
                EventField::parse_list(&f).map_err(|e| ParamError::invalid("fields", &e.value))
            })
            .transpose()?;

        Ok(EventQuery {
            window: TimeWindow::new(start, end),
            aggregation,
            min_points,
            fields,
        })
    }
}

/// Query parameters of `GET /timeseries`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeseriesListParams {
    /// Case-insensitive partial name match.
    pub name: Option<String>,
    /// Exact code.
    pub code: Option<String>,
    /// Comma separated uuids.
    pub uuid: Option<String>,
    /// Uuid of the owning location.
    pub location: Option<String>,
    /// Value type name or code.
    pub value_type: Option<String>,
    /// Partial match on name, code or description.
    pub search: Option<String>,
    /// Sort field, `-` prefixed for descending order.
    pub ordering: Option<String>,
    /// Event windowing.
    #[serde(flatten)]
    pub events: EventParams,
    /// Pagination.
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

impl TimeseriesListParams {
    /// Builds the database query for one page.
    ///
    /// An unparsable `location` uuid matches nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] for a malformed filter value.
    pub fn to_query(&self, page: Page) -> Result<TimeseriesQuery, ParamError> {
        let location = non_empty(self.location.as_ref());
        let (location, uuid) = match location.map(|l| Uuid::parse_str(&l)) {
            Some(Ok(location)) => (Some(location), self.uuid.as_deref().map(parse_uuid_list)),
            Some(Err(_)) => (None, Some(Vec::new())),
            None => (None, self.uuid.as_deref().map(parse_uuid_list)),
        };

        Ok(TimeseriesQuery {
            name: non_empty(self.name.as_ref()),
            code: non_empty(self.code.as_ref()),
            uuid,
            location,
            value_type: non_empty(self.value_type.as_ref())
                .map(|v| {
                    ValueType::parse_choice(&v).map_err(|_| ParamError::invalid("value_type", &v))
                })
                .transpose()?,
            search: non_empty(self.search.as_ref()),
            ordering: self
                .ordering
                .as_deref()
                .map(parse_ordering::<TimeseriesOrderField>)
                .transpose()?,
            page,
        })
    }
}

/// Query parameters of `GET /timeseries/data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MultiSeriesParams {
    /// Comma separated series uuids.
    pub uuid: Option<String>,
    /// Event windowing.
    #[serde(flatten)]
    pub events: EventParams,
}

impl MultiSeriesParams {
    /// The requested series and their shared windowing.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::IncompleteSeriesRequest`] without a valid uuid
    /// or without both window bounds, and any error of
    /// [`EventParams::to_event_query`].
    pub fn to_request(&self) -> Result<(Vec<Uuid>, EventQuery), ParamError> {
        let uuids = self
            .uuid
            .as_deref()
            .map(parse_uuid_list)
            .unwrap_or_default();
        if uuids.is_empty() {
            return Err(ParamError::IncompleteSeriesRequest);
        }
        let query = self
            .events
            .embedded_query()?
            .ok_or(ParamError::IncompleteSeriesRequest)?;
        Ok((uuids, query))
    }
}

/// Query parameters of the reference table list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferenceListParams {
    /// Partial match on the table's search columns.
    pub search: Option<String>,
    /// Pagination.
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

impl ReferenceListParams {
    /// The trimmed search term, if any.
    #[must_use]
    pub fn search_term(&self) -> Option<String> {
        non_empty(self.search.as_ref())
    }
}

/// Query parameters of `GET /search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    /// Search terms.
    pub q: Option<String>,
    /// Comma separated entity kinds.
    #[serde(rename = "type")]
    pub kinds: Option<String>,
    /// Comma separated url fragments to drop.
    pub exclude: Option<String>,
    /// Pagination.
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

impl SearchParams {
    /// Builds the search query.
    ///
    /// Unknown kinds are ignored. Returns `None` when kinds were requested
    /// but none of them is searchable, which yields no results.
    #[must_use]
    pub fn to_query(&self) -> Option<SearchQuery> {
        let requested = self
            .kinds
            .as_deref()
            .map(|k| split_list(k).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut kinds = requested
            .iter()
            .filter_map(|k| k.to_ascii_lowercase().parse::<SearchKind>().ok())
            .collect::<Vec<_>>();
        kinds.sort_unstable();
        kinds.dedup();

        if !requested.is_empty() && kinds.is_empty() {
            return None;
        }

        Some(SearchQuery {
            q: non_empty(self.q.as_ref()),
            kinds,
            exclude: self
                .exclude
                .as_deref()
                .map(|e| split_list(e).map(ToString::to_string).collect())
                .unwrap_or_default(),
        })
    }
}
