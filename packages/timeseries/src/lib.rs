#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Windowed event resolution for dd-node timeseries.
//!
//! Turns a raw, time-ordered observation sequence plus the request's
//! windowing parameters (time range, aggregation window, minimum point
//! count, field selection) into the events returned to a client. Everything
//! here is pure computation: observations are fetched by the caller and no
//! state is kept between calls.

pub mod bucket;
pub mod dimension;
pub mod resolve;
pub mod summary;

use dd_node_timeseries_models::{AggregationWindow, ValueType};
use thiserror::Error;

pub use resolve::{EventQuery, choose_granularity, resolve};

/// Errors that can occur while resolving events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Malformed or inverted window, bad `min_points`, or an arithmetic
    /// overflow while computing buckets.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Aggregation requested on a series without numeric values.
    #[error("Aggregation '{aggregation}' is not supported for {value_type} timeseries")]
    UnsupportedAggregation {
        /// The requested granularity.
        aggregation: AggregationWindow,
        /// The series' value type.
        value_type: ValueType,
    },
}

impl ResolveError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}
