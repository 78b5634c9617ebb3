//! Timeseries endpoints: listing, detail, maintenance and event data.

use actix_web::{HttpRequest, HttpResponse, web};
use dd_node_database::timeseries;
use dd_node_database_models::TimeseriesRow;
use dd_node_server_models::params::{EventParams, MultiSeriesParams, TimeseriesListParams};
use dd_node_server_models::{
    ApiEvent, ApiSeriesEvents, ApiTimeseries, TimeseriesCreate, TimeseriesUpdateRequest,
    WriteRequest, WriteResponse,
};
use dd_node_timeseries::summary::coerce_batch;
use dd_node_timeseries::{EventQuery, resolve};
use dd_node_timeseries_models::timestamp::parse_timestamp_param;
use dd_node_timeseries_models::{Event, TimeWindow};
use switchy_database::Database;
use uuid::Uuid;

use super::list_response;
use crate::AppState;
use crate::error::ApiError;

async fn find(db: &dyn Database, uuid: &str) -> Result<TimeseriesRow, ApiError> {
    let not_found = || ApiError::NotFound(format!("Timeseries {uuid} not found"));
    let parsed = Uuid::parse_str(uuid).map_err(|_| not_found())?;
    timeseries::get_timeseries(db, &parsed)
        .await?
        .ok_or_else(not_found)
}

/// Fetches the observations of `series` inside the query window and
/// resolves them into events.
async fn series_events(
    db: &dyn Database,
    series: &TimeseriesRow,
    query: &EventQuery,
) -> Result<Vec<Event>, ApiError> {
    let observations = timeseries::fetch_observations(db, series.id, query.window).await?;
    Ok(resolve(&observations, query, series.value_type)?)
}

/// Events to embed in a list or detail view: `None` unless both bounds
/// were requested.
async fn embedded_events(
    db: &dyn Database,
    series: &TimeseriesRow,
    params: &EventParams,
) -> Result<Option<Vec<Event>>, ApiError> {
    let Some(query) = params.embedded_query()? else {
        return Ok(None);
    };
    Ok(Some(series_events(db, series, &query).await?))
}

/// `GET /api/timeseries`
pub async fn list(
    state: web::Data<AppState>,
    params: web::Query<TimeseriesListParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let pagination = params.pagination.resolve()?;
    let query = params.to_query(pagination.window())?;

    let paged = timeseries::list_timeseries(db, &query).await?;

    let mut rows = Vec::with_capacity(paged.rows.len());
    for series in paged.rows {
        let events = embedded_events(db, &series, &params.events).await?;
        rows.push(ApiTimeseries::new(series, events));
    }

    list_response(&req, pagination, paged.count, rows)
}

/// `POST /api/timeseries`
pub async fn create(
    state: web::Data<AppState>,
    body: web::Json<TimeseriesCreate>,
) -> Result<HttpResponse, ApiError> {
    let new = body.into_inner().into_new()?;
    let row = timeseries::create_timeseries(state.db.as_ref(), &new).await?;
    Ok(HttpResponse::Created().json(ApiTimeseries::new(row, None)))
}

/// `GET /api/timeseries/{uuid}`
pub async fn detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<EventParams>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let series = find(db, &path).await?;
    let events = embedded_events(db, &series, &params).await?;
    Ok(HttpResponse::Ok().json(ApiTimeseries::new(series, events)))
}

/// `PUT`/`PATCH /api/timeseries/{uuid}`
///
/// Fields left out keep their value. Shares the version token with event
/// writes, so `expected_version` rejects updates based on a stale read.
pub async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<TimeseriesUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let series = find(db, &path).await?;
    let (update, expected_version) = body.into_inner().into_update(series.value_type)?;

    let row = timeseries::update_timeseries(db, &series, &update, expected_version).await?;
    Ok(HttpResponse::Ok().json(ApiTimeseries::new(row, None)))
}

/// `DELETE /api/timeseries/{uuid}`
pub async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let series = find(db, &path).await?;
    timeseries::delete_timeseries(db, &series).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// `GET /api/timeseries/{uuid}/data`
///
/// Unlike the detail view, one bound is enough. Without either bound no
/// events are returned.
pub async fn data(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<EventParams>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let series = find(db, &path).await?;
    let events = match params.data_query()? {
        Some(query) => series_events(db, &series, &query).await?,
        None => Vec::new(),
    };
    Ok(HttpResponse::Ok().json(ApiEvent::shape(&series.uuid, series.value_type, events)))
}

/// Rejects single event lookups on series that do not store files.
fn require_file_series(series: &TimeseriesRow) -> Result<(), ApiError> {
    if series.value_type.is_file() {
        Ok(())
    } else {
        Err(ApiError::MethodNotAllowed(
            "Cannot GET single event detail of non-file timeseries.".to_string(),
        ))
    }
}

fn event_timestamp(raw: &str) -> Result<i64, ApiError> {
    parse_timestamp_param(raw)
        .map_err(|e| ApiError::InvalidParameter(e.to_string()))?
        .ok_or_else(|| ApiError::InvalidParameter("Missing event timestamp".to_string()))
}

/// `GET /api/timeseries/{uuid}/data/{timestamp}`
///
/// The stored file reference of one event of a file-like series.
pub async fn event_detail(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let (uuid, raw_timestamp) = path.into_inner();
    let series = find(db, &uuid).await?;
    require_file_series(&series)?;
    let timestamp = event_timestamp(&raw_timestamp)?;

    let observation = timeseries::fetch_observations(
        db,
        series.id,
        TimeWindow::between(timestamp, timestamp),
    )
    .await?
    .into_iter()
    .next()
    .ok_or_else(|| ApiError::NotFound(format!("No event of {uuid} at {timestamp}")))?;

    Ok(HttpResponse::Ok().json(Event::from(&observation)))
}

/// `POST /api/timeseries/{uuid}/data`
///
/// Accepts a bare event array, or `{events, expected_version}` to reject
/// the write when the series changed since the client read it.
pub async fn write(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<WriteRequest>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let series = find(db, &path).await?;

    let (events, expected_version) = body.into_inner().into_parts()?;
    let events = coerce_batch(series.value_type, events)?;

    let outcome = timeseries::write_events(db, &series, &events, expected_version).await?;

    Ok(HttpResponse::Created().json(WriteResponse {
        written: outcome.written,
        version: outcome.version,
    }))
}

/// `GET /api/timeseries/data?uuid=a,b&start=..&end=..`
///
/// Unknown series are skipped.
pub async fn multi_data(
    state: web::Data<AppState>,
    params: web::Query<MultiSeriesParams>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let (uuids, query) = params.to_request()?;

    let mut results = Vec::with_capacity(uuids.len());
    for uuid in uuids {
        let Some(series) = timeseries::get_timeseries(db, &uuid).await? else {
            log::debug!("Skipping unknown timeseries {uuid}");
            continue;
        };
        let events = series_events(db, &series, &query).await?;
        results.push(ApiSeriesEvents {
            uuid,
            events: ApiEvent::shape(&uuid, series.value_type, events),
        });
    }

    Ok(HttpResponse::Ok().json(results))
}

#[cfg(test)]
mod tests {
    use dd_node_timeseries_models::{ObservationValue, ValueType};

    use super::*;

    fn series(value_type: ValueType) -> TimeseriesRow {
        TimeseriesRow {
            id: 1,
            uuid: Uuid::nil(),
            name: None,
            code: "scan".to_string(),
            description: None,
            value_type,
            location_uuid: Uuid::nil(),
            location_name: "Dam".to_string(),
            observation_type: None,
            datasource: None,
            timeseries_type: None,
            device: String::new(),
            interval: None,
            start: None,
            end: None,
            last_value_decimal: None,
            last_value_text: None,
            version: 0,
            extra_metadata: None,
            last_modified: None,
        }
    }

    #[test]
    fn single_events_are_served_for_file_series_only() {
        assert!(require_file_series(&series(ValueType::Image)).is_ok());
        assert!(require_file_series(&series(ValueType::File)).is_ok());
        let err = require_file_series(&series(ValueType::Float)).unwrap_err();
        assert_eq!(err.mapping().1, 10);
        assert!(matches!(err, ApiError::MethodNotAllowed(_)));
    }

    #[test]
    fn event_timestamps_accept_millis_and_zoned_datetimes() {
        assert_eq!(event_timestamp("5000").unwrap(), 5000);
        assert_eq!(
            event_timestamp("2013-08-29T08:07:44Z").unwrap(),
            1_377_763_664_000
        );
        assert!(matches!(
            event_timestamp("2013-08-29T08:07:44"),
            Err(ApiError::InvalidParameter(_))
        ));
        assert!(matches!(
            event_timestamp(" "),
            Err(ApiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn file_event_urls_resolve_to_the_single_event_route() {
        let events = ApiEvent::shape(
            &Uuid::nil(),
            ValueType::Image,
            vec![Event::new(5000, ObservationValue::Text("a.png".into()))],
        );
        let ApiEvent::File { url, .. } = &events[0] else {
            panic!("expected a file event");
        };
        let (uuid, timestamp) = url
            .strip_prefix("/api/timeseries/")
            .and_then(|rest| rest.split_once("/data/"))
            .unwrap();
        assert_eq!(uuid, Uuid::nil().to_string());
        assert_eq!(event_timestamp(timestamp).unwrap(), 5000);
    }
}
