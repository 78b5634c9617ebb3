//! Location endpoints.

use actix_web::{HttpRequest, HttpResponse, web};
use dd_node_database::{locations, timeseries};
use dd_node_database_models::{LocationRow, LocationUpdate, NewLocation, TimeseriesRow};
use dd_node_server_models::params::{EventParams, LocationListParams};
use dd_node_server_models::{ApiLocation, LocationCreate, LocationUpdateRequest};
use dd_node_spatial::{force_3d, has_z, parse_geometry};
use dd_node_timeseries::dimension::{ColumnMeta, SeriesColumn, unify};
use switchy_database::Database;

use super::{check_uuid_prefix, list_response};
use crate::AppState;
use crate::error::ApiError;

async fn find(db: &dyn Database, uuid: &str) -> Result<LocationRow, ApiError> {
    check_uuid_prefix(uuid)?;
    locations::find_location(db, uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Location {uuid} not found")))
}

/// `GET /api/locations`
pub async fn list(
    state: web::Data<AppState>,
    params: web::Query<LocationListParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let pagination = params.pagination.resolve()?;
    let query = params.to_query(pagination.window())?;

    let paged = locations::list_locations(state.db.as_ref(), &query).await?;
    let rows = paged.rows.into_iter().map(ApiLocation::from).collect();

    list_response(&req, pagination, paged.count, rows)
}

/// Parses a `GeoJSON` geometry and coerces it to 3D for storage.
fn stored_geometry(code: &str, value: serde_json::Value) -> Result<serde_json::Value, ApiError> {
    let mut geometry = parse_geometry(value)?;
    if !has_z(&geometry) {
        log::debug!("Storing 2D geometry of location {code} in 3D");
        geometry = force_3d(geometry)?;
    }
    serde_json::to_value(&geometry).map_err(|e| ApiError::Internal(e.to_string()))
}

/// `POST /api/locations`
///
/// The geometry, when given, is stored in 3D.
pub async fn create(
    state: web::Data<AppState>,
    body: web::Json<LocationCreate>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.code.trim().is_empty() || body.name.trim().is_empty() {
        return Err(ApiError::Validation(
            "Both code and name are required".to_string(),
        ));
    }

    let geometry = body
        .geometry
        .map(|g| stored_geometry(&body.code, g))
        .transpose()?;

    let location = NewLocation {
        code: body.code,
        name: body.name,
        geometry,
        extra_metadata: body.extra_metadata,
        last_modified_by: String::new(),
    };

    let row = locations::create_location(state.db.as_ref(), &location).await?;
    Ok(HttpResponse::Created().json(ApiLocation::from(row)))
}

/// `GET /api/locations/{uuid}`
///
/// Accepts any unambiguous uuid prefix of at least seven characters.
pub async fn detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let location = find(state.db.as_ref(), &path).await?;
    Ok(HttpResponse::Ok().json(ApiLocation::from(location)))
}

/// Validates an update request against the stored location.
fn location_update(
    location: &LocationRow,
    body: LocationUpdateRequest,
) -> Result<(LocationUpdate, Option<i64>), ApiError> {
    let blank = |v: &Option<String>| v.as_ref().is_some_and(|v| v.trim().is_empty());
    if blank(&body.code) || blank(&body.name) {
        return Err(ApiError::Validation(
            "Code and name must not be blank".to_string(),
        ));
    }

    let code = body.code.as_deref().unwrap_or(&location.code);
    let geometry = body
        .geometry
        .map(|g| stored_geometry(code, g))
        .transpose()?;

    Ok((
        LocationUpdate {
            geometry,
            code: body.code,
            name: body.name,
            extra_metadata: body.extra_metadata,
            last_modified_by: String::new(),
        },
        body.expected_version,
    ))
}

/// `PUT`/`PATCH /api/locations/{uuid}`
///
/// Fields left out keep their value. With `expected_version` the update is
/// rejected once another write changed the location.
pub async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<LocationUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let location = find(db, &path).await?;
    let (update, expected_version) = location_update(&location, body.into_inner())?;

    let row = locations::update_location(db, &location, &update, expected_version).await?;
    Ok(HttpResponse::Ok().json(ApiLocation::from(row)))
}

/// `DELETE /api/locations/{uuid}`
pub async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let location = find(db, &path).await?;
    locations::delete_location(db, &location).await?;
    Ok(HttpResponse::NoContent().finish())
}

fn series_meta(series: &TimeseriesRow) -> ColumnMeta {
    ColumnMeta {
        name: series.name.clone().unwrap_or_else(|| series.code.clone()),
        column_type: series.value_type.to_string(),
        quantity: "parameter".to_string(),
        unit: series
            .observation_type
            .as_ref()
            .map(dd_node_database_models::ObservationTypeRow::referenced_unit),
    }
}

/// `GET /api/locations/{uuid}/timeseries`
///
/// Returns every series of the location aligned on one time axis, limited
/// to the `start`/`end` window. Without either bound the columns carry no
/// values.
pub async fn time_dimension(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<EventParams>,
) -> Result<HttpResponse, ApiError> {
    let db = state.db.as_ref();
    let location = find(db, &path).await?;
    let window = params.data_query()?.map(|q| q.window);

    let mut columns = Vec::new();
    for series in timeseries::location_timeseries(db, &location.uuid).await? {
        let observations = match window {
            Some(window) => timeseries::fetch_observations(db, series.id, window).await?,
            None => Vec::new(),
        };
        columns.push(SeriesColumn {
            meta: series_meta(&series),
            observations,
        });
    }

    Ok(HttpResponse::Ok().json(unify(&columns)))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn location() -> LocationRow {
        LocationRow {
            id: 1,
            uuid: Uuid::nil(),
            code: "DAM01".to_string(),
            name: "Dam".to_string(),
            geometry: None,
            extra_metadata: None,
            last_modified: None,
            last_modified_by: String::new(),
            version: 3,
        }
    }

    #[test]
    fn update_coerces_geometry_and_keeps_token() {
        let body: LocationUpdateRequest = serde_json::from_value(serde_json::json!({
            "geometry": { "type": "Point", "coordinates": [4.89, 52.37] },
            "expected_version": 3,
        }))
        .unwrap();
        let (update, expected) = location_update(&location(), body).unwrap();
        assert_eq!(expected, Some(3));
        assert_eq!(update.code, None);
        assert_eq!(
            update.geometry.unwrap()["coordinates"],
            serde_json::json!([4.89, 52.37, 0.0])
        );
    }

    #[test]
    fn update_rejects_blank_names_and_bad_geometry() {
        let blank: LocationUpdateRequest =
            serde_json::from_value(serde_json::json!({ "name": "  " })).unwrap();
        assert!(matches!(
            location_update(&location(), blank),
            Err(ApiError::Validation(_))
        ));

        let feature: LocationUpdateRequest = serde_json::from_value(serde_json::json!({
            "geometry": { "type": "Feature", "geometry": null, "properties": null },
        }))
        .unwrap();
        assert!(matches!(
            location_update(&location(), feature),
            Err(ApiError::Validation(_))
        ));
    }
}
