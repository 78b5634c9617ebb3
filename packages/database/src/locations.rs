//! Location queries.
//!
//! Geometries are stored as `geometry(GeometryZ, 4326)` and exchanged as
//! `GeoJSON` text.

use dd_node_database_models::{
    LocationOrderField, LocationQuery, LocationRow, LocationUpdate, NewLocation, Ordering, Paged,
};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;
use crate::rows::{json_column, json_param, timestamp_column, uuid_column};
use crate::sql::{SqlBuilder, contains_pattern};

const LOCATION_COLUMNS: &str = "l.id, l.uuid::text AS uuid, l.code, l.name,
        ST_AsGeoJSON(l.geometry) AS geometry,
        l.extra_metadata::text AS extra_metadata,
        l.last_modified, l.last_modified_by, l.version";

const GEOMETRY_FROM_GEOJSON: &str = "ST_Force3D(ST_SetSRID(ST_GeomFromGeoJSON(?::text), 4326))";

fn row_to_location(row: &switchy_database::Row) -> Result<LocationRow, DbError> {
    let geometry: Option<String> = row.to_value("geometry").unwrap_or(None);
    let geometry = geometry.map(|g| serde_json::from_str(&g)).transpose()?;

    Ok(LocationRow {
        id: row.to_value("id").unwrap_or(0),
        uuid: uuid_column(row, "uuid")?,
        code: row.to_value("code").unwrap_or_default(),
        name: row.to_value("name").unwrap_or_default(),
        geometry,
        extra_metadata: json_column(row, "extra_metadata"),
        last_modified: timestamp_column(row, "last_modified"),
        last_modified_by: row.to_value("last_modified_by").unwrap_or_default(),
        version: row.to_value("version").unwrap_or(0),
    })
}

fn apply_filters(b: &mut SqlBuilder, query: &LocationQuery) {
    if let Some(bbox) = &query.bbox {
        b.and(
            "l.geometry && ST_MakeEnvelope(?, ?, ?, ?, 4326)",
            [
                DatabaseValue::Real64(bbox.west),
                DatabaseValue::Real64(bbox.south),
                DatabaseValue::Real64(bbox.east),
                DatabaseValue::Real64(bbox.north),
            ],
        );
    }

    if let Some(name) = &query.name {
        b.and("l.name ILIKE ?", [DatabaseValue::String(contains_pattern(name))]);
    }

    if let Some(code) = &query.code {
        b.and("l.code = ?", [DatabaseValue::String(code.clone())]);
    }

    if let Some(uuids) = &query.uuid {
        b.and_in(
            "l.uuid::text",
            uuids
                .iter()
                .map(|u| DatabaseValue::String(u.to_string()))
                .collect(),
        );
    }

    match query.geom_isnull {
        Some(true) => {
            b.push(" AND l.geometry IS NULL");
        }
        Some(false) => {
            b.push(" AND l.geometry IS NOT NULL");
        }
        None => {}
    }
}

/// Lists locations matching the query, with the total match count.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn list_locations(
    db: &dyn Database,
    query: &LocationQuery,
) -> Result<Paged<LocationRow>, DbError> {
    let mut count = SqlBuilder::new("SELECT COUNT(*) AS count FROM locations l WHERE 1=1");
    apply_filters(&mut count, query);
    let rows = db.query_raw_params(&count.sql, &count.params).await?;
    let total: i64 = rows
        .first()
        .and_then(|r| r.to_value("count").ok())
        .unwrap_or(0);

    let mut select = SqlBuilder::new(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations l WHERE 1=1"
    ));
    apply_filters(&mut select, query);

    let ordering = query.ordering.unwrap_or(Ordering {
        field: LocationOrderField::Name,
        descending: false,
    });
    select.push(&format!(
        " ORDER BY {} {}, l.id",
        ordering.field.column(),
        ordering.direction()
    ));
    select.page(query.page);

    let rows = db.query_raw_params(&select.sql, &select.params).await?;

    Ok(Paged {
        count: u64::try_from(total).unwrap_or(0),
        rows: rows.iter().map(row_to_location).collect::<Result<_, _>>()?,
    })
}

/// Finds the location whose uuid starts with `uuid_prefix`.
///
/// The prefix is matched case-insensitively; the caller enforces a minimum
/// length. Prefixes containing anything but hex digits and hyphens never
/// match.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn find_location(
    db: &dyn Database,
    uuid_prefix: &str,
) -> Result<Option<LocationRow>, DbError> {
    if !uuid_prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Ok(None);
    }

    let mut select = SqlBuilder::new(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations l WHERE 1=1"
    ));
    select.and(
        "l.uuid::text LIKE ?",
        [DatabaseValue::String(format!(
            "{}%",
            uuid_prefix.to_ascii_lowercase()
        ))],
    );
    select.push(" ORDER BY l.id LIMIT 1");

    let rows = db.query_raw_params(&select.sql, &select.params).await?;
    rows.first().map(row_to_location).transpose()
}

/// Inserts a location and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails, e.g. on an invalid geometry.
pub async fn create_location(
    db: &dyn Database,
    location: &NewLocation,
) -> Result<LocationRow, DbError> {
    let geometry = location
        .geometry
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let rows = db
        .query_raw_params(
            "INSERT INTO locations (code, name, geometry, extra_metadata, last_modified, last_modified_by)
             VALUES (
                 $1, $2,
                 CASE WHEN $3::text IS NULL THEN NULL
                      ELSE ST_Force3D(ST_SetSRID(ST_GeomFromGeoJSON($3::text), 4326))
                 END,
                 $4::jsonb, NOW(), $5
             )
             RETURNING uuid::text AS uuid",
            &[
                DatabaseValue::String(location.code.clone()),
                DatabaseValue::String(location.name.clone()),
                geometry.map_or(DatabaseValue::Null, DatabaseValue::String),
                json_param(location.extra_metadata.as_ref())?,
                DatabaseValue::String(location.last_modified_by.clone()),
            ],
        )
        .await?;

    let row = rows.first().ok_or_else(|| DbError::Conversion {
        message: "Failed to get location uuid from insert".to_string(),
    })?;
    let uuid = uuid_column(row, "uuid")?;

    log::info!("Created location {uuid} ({})", location.code);

    find_location(db, &uuid.to_string())
        .await?
        .ok_or_else(|| DbError::Conversion {
            message: format!("Location {uuid} vanished after insert"),
        })
}

/// Applies `update` to a stored location and returns the updated row.
///
/// Every update bumps the location's version. With `expected_version` the
/// update only applies to that version.
///
/// # Errors
///
/// Returns [`DbError::VersionConflict`] when the location is no longer at
/// `expected_version`, or [`DbError`] if the database operation fails.
pub async fn update_location(
    db: &dyn Database,
    location: &LocationRow,
    update: &LocationUpdate,
    expected_version: Option<i64>,
) -> Result<LocationRow, DbError> {
    let geometry_clause = format!("geometry = {GEOMETRY_FROM_GEOJSON}");
    let mut assignments = Vec::new();
    if let Some(code) = &update.code {
        assignments.push(("code = ?", DatabaseValue::String(code.clone())));
    }
    if let Some(name) = &update.name {
        assignments.push(("name = ?", DatabaseValue::String(name.clone())));
    }
    if let Some(geometry) = &update.geometry {
        assignments.push((
            geometry_clause.as_str(),
            DatabaseValue::String(serde_json::to_string(geometry)?),
        ));
    }
    if update.extra_metadata.is_some() {
        assignments.push((
            "extra_metadata = ?::jsonb",
            json_param(update.extra_metadata.as_ref())?,
        ));
    }
    assignments.push((
        "last_modified_by = ?",
        DatabaseValue::String(update.last_modified_by.clone()),
    ));

    let mut sql =
        SqlBuilder::versioned_update("locations", location.id, assignments, expected_version);
    sql.push(" RETURNING id");

    let rows = db.query_raw_params(&sql.sql, &sql.params).await?;
    if rows.is_empty() {
        log::debug!(
            "Rejected update of location {}: expected version {expected_version:?}",
            location.uuid
        );
        return Err(DbError::VersionConflict {
            uuid: location.uuid,
            expected: expected_version.unwrap_or(location.version),
        });
    }

    log::info!("Updated location {}", location.uuid);

    find_location(db, &location.uuid.to_string())
        .await?
        .ok_or_else(|| DbError::Conversion {
            message: format!("Location {} vanished after update", location.uuid),
        })
}

/// Deletes a location together with its timeseries and their events.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn delete_location(db: &dyn Database, location: &LocationRow) -> Result<(), DbError> {
    db.exec_raw_params(
        "DELETE FROM locations WHERE id = $1",
        &[DatabaseValue::Int64(location.id)],
    )
    .await?;
    log::info!("Deleted location {} ({})", location.uuid, location.code);
    Ok(())
}
