//! Timeseries metadata, observation reads and event writes.

use dd_node_database_models::{
    NewTimeseries, ObservationTypeRow, Ordering, Paged, TimeseriesOrderField, TimeseriesQuery,
    TimeseriesRow, TimeseriesUpdate,
};
use dd_node_timeseries::summary::SeriesSummary;
use dd_node_timeseries_models::{Observation, ObservationValue, TimeWindow, ValueScale, ValueType};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};
use uuid::Uuid;

use crate::DbError;
use crate::rows::{json_column, json_param, timestamp_column, uuid_column};
use crate::sql::{SqlBuilder, contains_pattern, optional_text};

const TIMESERIES_SELECT: &str = "SELECT t.id, t.uuid::text AS uuid, t.name, t.code, t.description,
            t.value_type::INTEGER AS value_type,
            l.uuid::text AS location_uuid, l.name AS location_name,
            o.id AS ot_id, o.code AS ot_code, o.parameter AS ot_parameter,
            o.unit AS ot_unit, o.reference_frame AS ot_reference_frame,
            o.compartment AS ot_compartment, o.description AS ot_description,
            o.scale::INTEGER AS ot_scale,
            d.name AS datasource, tt.name AS timeseries_type,
            t.device, t.interval_seconds, t.start_ms, t.end_ms,
            t.last_value_decimal, t.last_value_text, t.version,
            t.extra_metadata::text AS extra_metadata, t.last_modified
     FROM timeseries t
     JOIN locations l ON t.location_id = l.id
     LEFT JOIN observation_types o ON t.observation_type_id = o.id
     LEFT JOIN data_sources d ON t.datasource_id = d.id
     LEFT JOIN timeseries_types tt ON t.timeseries_type_id = tt.id
     WHERE 1=1";

fn row_to_observation_type(row: &switchy_database::Row) -> Option<ObservationTypeRow> {
    let id: Option<i64> = row.to_value("ot_id").unwrap_or(None);
    let scale: i32 = row.to_value("ot_scale").unwrap_or(2);

    Some(ObservationTypeRow {
        id: id?,
        code: row.to_value("ot_code").unwrap_or_default(),
        parameter: row.to_value("ot_parameter").unwrap_or_default(),
        unit: row.to_value("ot_unit").unwrap_or_default(),
        reference_frame: row.to_value("ot_reference_frame").unwrap_or(None),
        compartment: row.to_value("ot_compartment").unwrap_or(None),
        description: row.to_value("ot_description").unwrap_or_default(),
        scale: i16::try_from(scale)
            .ok()
            .and_then(|s| ValueScale::from_code(s).ok())
            .unwrap_or(ValueScale::Interval),
    })
}

fn row_to_timeseries(row: &switchy_database::Row) -> Result<TimeseriesRow, DbError> {
    let value_type_code: i32 = row.to_value("value_type").unwrap_or(1);
    let value_type = i16::try_from(value_type_code)
        .ok()
        .and_then(|c| ValueType::from_code(c).ok())
        .ok_or_else(|| DbError::Conversion {
            message: format!("Unknown value type code {value_type_code}"),
        })?;

    Ok(TimeseriesRow {
        id: row.to_value("id").unwrap_or(0),
        uuid: uuid_column(row, "uuid")?,
        name: row.to_value("name").unwrap_or(None),
        code: row.to_value("code").unwrap_or_default(),
        description: row.to_value("description").unwrap_or(None),
        value_type,
        location_uuid: uuid_column(row, "location_uuid")?,
        location_name: row.to_value("location_name").unwrap_or_default(),
        observation_type: row_to_observation_type(row),
        datasource: row.to_value("datasource").unwrap_or(None),
        timeseries_type: row.to_value("timeseries_type").unwrap_or(None),
        device: row.to_value("device").unwrap_or_default(),
        interval: row.to_value("interval_seconds").unwrap_or(None),
        start: row.to_value("start_ms").unwrap_or(None),
        end: row.to_value("end_ms").unwrap_or(None),
        last_value_decimal: row.to_value("last_value_decimal").unwrap_or(None),
        last_value_text: row.to_value("last_value_text").unwrap_or(None),
        version: row.to_value("version").unwrap_or(0),
        extra_metadata: json_column(row, "extra_metadata"),
        last_modified: timestamp_column(row, "last_modified"),
    })
}

fn apply_filters(b: &mut SqlBuilder, query: &TimeseriesQuery) {
    if let Some(name) = &query.name {
        b.and("t.name ILIKE ?", [DatabaseValue::String(contains_pattern(name))]);
    }

    if let Some(code) = &query.code {
        b.and("t.code = ?", [DatabaseValue::String(code.clone())]);
    }

    if let Some(uuids) = &query.uuid {
        b.and_in(
            "t.uuid::text",
            uuids
                .iter()
                .map(|u| DatabaseValue::String(u.to_string()))
                .collect(),
        );
    }

    if let Some(location) = &query.location {
        b.and(
            "l.uuid::text = ?",
            [DatabaseValue::String(location.to_string())],
        );
    }

    if let Some(value_type) = query.value_type {
        b.and(
            "t.value_type = ?",
            [DatabaseValue::Int32(i32::from(value_type.code()))],
        );
    }

    if let Some(search) = &query.search {
        let pattern = contains_pattern(search);
        b.and(
            "(t.name ILIKE ? OR t.code ILIKE ? OR t.description ILIKE ?)",
            [
                DatabaseValue::String(pattern.clone()),
                DatabaseValue::String(pattern.clone()),
                DatabaseValue::String(pattern),
            ],
        );
    }
}

/// Lists timeseries matching the query, with the total match count.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn list_timeseries(
    db: &dyn Database,
    query: &TimeseriesQuery,
) -> Result<Paged<TimeseriesRow>, DbError> {
    let mut count = SqlBuilder::new(
        "SELECT COUNT(*) AS count
         FROM timeseries t
         JOIN locations l ON t.location_id = l.id
         WHERE 1=1",
    );
    apply_filters(&mut count, query);
    let rows = db.query_raw_params(&count.sql, &count.params).await?;
    let total: i64 = rows
        .first()
        .and_then(|r| r.to_value("count").ok())
        .unwrap_or(0);

    let mut select = SqlBuilder::new(TIMESERIES_SELECT);
    apply_filters(&mut select, query);

    let ordering = query.ordering.unwrap_or(Ordering {
        field: TimeseriesOrderField::Name,
        descending: false,
    });
    select.push(&format!(
        " ORDER BY {} {} NULLS LAST, t.id",
        ordering.field.column(),
        ordering.direction()
    ));
    select.page(query.page);

    let rows = db.query_raw_params(&select.sql, &select.params).await?;

    Ok(Paged {
        count: u64::try_from(total).unwrap_or(0),
        rows: rows
            .iter()
            .map(row_to_timeseries)
            .collect::<Result<_, _>>()?,
    })
}

/// Gets a timeseries by uuid.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn get_timeseries(
    db: &dyn Database,
    uuid: &Uuid,
) -> Result<Option<TimeseriesRow>, DbError> {
    let mut select = SqlBuilder::new(TIMESERIES_SELECT);
    select.and("t.uuid::text = ?", [DatabaseValue::String(uuid.to_string())]);

    let rows = db.query_raw_params(&select.sql, &select.params).await?;
    rows.first().map(row_to_timeseries).transpose()
}

/// Lists every timeseries of a location, ordered by name.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn location_timeseries(
    db: &dyn Database,
    location: &Uuid,
) -> Result<Vec<TimeseriesRow>, DbError> {
    let query = TimeseriesQuery {
        location: Some(*location),
        ..TimeseriesQuery::default()
    };
    Ok(list_timeseries(db, &query).await?.rows)
}

async fn location_id(db: &dyn Database, uuid: &Uuid) -> Result<i64, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT id FROM locations WHERE uuid::text = $1",
            &[DatabaseValue::String(uuid.to_string())],
        )
        .await?;
    rows.first()
        .and_then(|r| r.to_value("id").ok())
        .ok_or_else(|| DbError::UnknownReference {
            kind: "location",
            key: uuid.to_string(),
        })
}

async fn observation_type_id(db: &dyn Database, code: &str) -> Result<i64, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT id FROM observation_types WHERE code = $1",
            &[DatabaseValue::String(code.to_string())],
        )
        .await?;
    rows.first()
        .and_then(|r| r.to_value("id").ok())
        .ok_or_else(|| DbError::UnknownReference {
            kind: "observation type",
            key: code.to_string(),
        })
}

/// Inserts a timeseries and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::UnknownReference`] when the location or observation
/// type does not exist, or [`DbError`] if the insert fails.
pub async fn create_timeseries(
    db: &dyn Database,
    series: &NewTimeseries,
) -> Result<TimeseriesRow, DbError> {
    let location = location_id(db, &series.location).await?;
    let observation_type_id = match &series.observation_type {
        Some(code) => DatabaseValue::Int64(observation_type_id(db, code).await?),
        None => DatabaseValue::Null,
    };

    let rows = db
        .query_raw_params(
            "INSERT INTO timeseries (
                 location_id, code, name, description, value_type, observation_type_id,
                 device, interval_seconds, extra_metadata, last_modified, last_modified_by
             )
             VALUES ($1, $2, $3, $4, $5::INTEGER::SMALLINT, $6, $7, $8, $9::jsonb, NOW(), $10)
             RETURNING uuid::text AS uuid",
            &[
                DatabaseValue::Int64(location),
                DatabaseValue::String(series.code.clone()),
                optional_text(series.name.as_ref()),
                optional_text(series.description.as_ref()),
                DatabaseValue::Int32(i32::from(series.value_type.code())),
                observation_type_id,
                DatabaseValue::String(series.device.clone()),
                series.interval.map_or(DatabaseValue::Null, DatabaseValue::Int32),
                json_param(series.extra_metadata.as_ref())?,
                DatabaseValue::String(series.last_modified_by.clone()),
            ],
        )
        .await?;

    let row = rows.first().ok_or_else(|| DbError::Conversion {
        message: "Failed to get timeseries uuid from insert".to_string(),
    })?;
    let uuid = uuid_column(row, "uuid")?;

    log::info!(
        "Created {} timeseries {uuid} ({}) at location {}",
        series.value_type,
        series.code,
        series.location
    );

    get_timeseries(db, &uuid)
        .await?
        .ok_or_else(|| DbError::Conversion {
            message: format!("Timeseries {uuid} vanished after insert"),
        })
}

/// Applies `update` to a stored timeseries and returns the updated row.
///
/// Shares the version token with event writes: every update bumps the
/// version, and with `expected_version` only that version is updated.
///
/// # Errors
///
/// Returns [`DbError::VersionConflict`] on a stale token,
/// [`DbError::UnknownReference`] for an unknown observation type, or
/// [`DbError`] if the database operation fails.
pub async fn update_timeseries(
    db: &dyn Database,
    series: &TimeseriesRow,
    update: &TimeseriesUpdate,
    expected_version: Option<i64>,
) -> Result<TimeseriesRow, DbError> {
    let mut assignments = Vec::new();
    if let Some(code) = &update.code {
        assignments.push(("code = ?", DatabaseValue::String(code.clone())));
    }
    if let Some(name) = &update.name {
        assignments.push(("name = ?", DatabaseValue::String(name.clone())));
    }
    if let Some(description) = &update.description {
        assignments.push(("description = ?", DatabaseValue::String(description.clone())));
    }
    if let Some(code) = &update.observation_type {
        assignments.push((
            "observation_type_id = ?",
            DatabaseValue::Int64(observation_type_id(db, code).await?),
        ));
    }
    if let Some(device) = &update.device {
        assignments.push(("device = ?", DatabaseValue::String(device.clone())));
    }
    if let Some(interval) = update.interval {
        assignments.push(("interval_seconds = ?", DatabaseValue::Int32(interval)));
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
        SqlBuilder::versioned_update("timeseries", series.id, assignments, expected_version);
    sql.push(" RETURNING id");

    let rows = db.query_raw_params(&sql.sql, &sql.params).await?;
    if rows.is_empty() {
        log::debug!(
            "Rejected update of timeseries {}: expected version {expected_version:?}",
            series.uuid
        );
        return Err(DbError::VersionConflict {
            uuid: series.uuid,
            expected: expected_version.unwrap_or(series.version),
        });
    }

    log::info!("Updated timeseries {}", series.uuid);

    get_timeseries(db, &series.uuid)
        .await?
        .ok_or_else(|| DbError::Conversion {
            message: format!("Timeseries {} vanished after update", series.uuid),
        })
}

/// Deletes a timeseries and its events.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn delete_timeseries(db: &dyn Database, series: &TimeseriesRow) -> Result<(), DbError> {
    db.exec_raw_params(
        "DELETE FROM timeseries WHERE id = $1",
        &[DatabaseValue::Int64(series.id)],
    )
    .await?;
    log::info!("Deleted timeseries {} ({})", series.uuid, series.code);
    Ok(())
}

/// Fetches the observations of a series inside `window`, ordered by
/// timestamp. Both bounds are inclusive; an absent bound is unbounded.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_observations(
    db: &dyn Database,
    series_id: i64,
    window: TimeWindow,
) -> Result<Vec<Observation>, DbError> {
    let mut select = SqlBuilder::new(
        "SELECT timestamp_ms, value_decimal, value_text
         FROM observations
         WHERE 1=1",
    );
    select.and("timeseries_id = ?", [DatabaseValue::Int64(series_id)]);
    if let Some(start) = window.start {
        select.and("timestamp_ms >= ?", [DatabaseValue::Int64(start)]);
    }
    if let Some(end) = window.end {
        select.and("timestamp_ms <= ?", [DatabaseValue::Int64(end)]);
    }
    select.push(" ORDER BY timestamp_ms");

    let rows = db.query_raw_params(&select.sql, &select.params).await?;

    let mut observations = Vec::with_capacity(rows.len());
    for row in &rows {
        let timestamp: i64 = row.to_value("timestamp_ms").unwrap_or(0);
        let decimal: Option<f64> = row.to_value("value_decimal").unwrap_or(None);
        let text: Option<String> = row.to_value("value_text").unwrap_or(None);

        let value = match (decimal, text) {
            (Some(v), _) => ObservationValue::Number(v),
            (None, Some(t)) => ObservationValue::Text(t),
            (None, None) => ObservationValue::Number(f64::NAN),
        };
        observations.push(Observation { timestamp, value });
    }

    log::debug!(
        "Fetched {} observations for series {series_id}",
        observations.len()
    );

    Ok(observations)
}

/// Result of a successful event write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Number of events inserted or replaced.
    pub written: u64,
    /// The series' version after the write.
    pub version: i64,
}

fn value_params(value: &ObservationValue) -> [DatabaseValue; 2] {
    match value {
        ObservationValue::Number(v) => [DatabaseValue::Real64(*v), DatabaseValue::Null],
        ObservationValue::Text(t) => [DatabaseValue::Null, DatabaseValue::String(t.clone())],
    }
}

/// Writes events to a series in one transaction.
///
/// The series version is bumped first. With `expected_version` the bump is
/// conditional, and a mismatch aborts the write with
/// [`DbError::VersionConflict`] before any event is stored. Events replace
/// existing observations at the same timestamp. The series' first/last
/// summary is updated from the written events.
///
/// Values must already be coerced to the series' value type.
///
/// # Errors
///
/// Returns [`DbError`] if the version check fails or any database operation
/// fails; nothing is written in either case.
pub async fn write_events(
    db: &dyn Database,
    series: &TimeseriesRow,
    events: &[Observation],
    expected_version: Option<i64>,
) -> Result<WriteOutcome, DbError> {
    let txn = db.begin_transaction().await?;

    let mut bump =
        SqlBuilder::versioned_update("timeseries", series.id, vec![], expected_version);
    bump.push(" RETURNING version, start_ms, end_ms, last_value_decimal, last_value_text");

    let rows = txn.query_raw_params(&bump.sql, &bump.params).await?;
    let Some(row) = rows.first() else {
        txn.rollback().await?;
        log::debug!(
            "Rejected write to {}: expected version {expected_version:?}",
            series.uuid
        );
        return Err(DbError::VersionConflict {
            uuid: series.uuid,
            expected: expected_version.unwrap_or(series.version),
        });
    };

    let version: i64 = row.to_value("version").unwrap_or(0);
    let last_decimal: Option<f64> = row.to_value("last_value_decimal").unwrap_or(None);
    let last_text: Option<String> = row.to_value("last_value_text").unwrap_or(None);
    let current = SeriesSummary {
        start: row.to_value("start_ms").unwrap_or(None),
        end: row.to_value("end_ms").unwrap_or(None),
        last_value: if series.value_type.is_numeric() {
            last_decimal.map(ObservationValue::Number)
        } else {
            last_text.map(ObservationValue::Text)
        },
    };

    let mut written = 0u64;
    for event in events {
        let [decimal, text] = value_params(&event.value);
        written += txn
            .exec_raw_params(
                "INSERT INTO observations (timeseries_id, timestamp_ms, value_decimal, value_text)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (timeseries_id, timestamp_ms) DO UPDATE SET
                     value_decimal = EXCLUDED.value_decimal,
                     value_text = EXCLUDED.value_text",
                &[
                    DatabaseValue::Int64(series.id),
                    DatabaseValue::Int64(event.timestamp),
                    decimal,
                    text,
                ],
            )
            .await?;
    }

    if let Some(summary) = current.apply(events) {
        let [decimal, text] = summary
            .last_value
            .as_ref()
            .map_or([DatabaseValue::Null, DatabaseValue::Null], value_params);
        txn.exec_raw_params(
            "UPDATE timeseries SET
                 start_ms = $2, end_ms = $3,
                 last_value_decimal = $4, last_value_text = $5
             WHERE id = $1",
            &[
                DatabaseValue::Int64(series.id),
                summary.start.map_or(DatabaseValue::Null, DatabaseValue::Int64),
                summary.end.map_or(DatabaseValue::Null, DatabaseValue::Int64),
                decimal,
                text,
            ],
        )
        .await?;
    }

    txn.commit().await?;

    log::info!(
        "Wrote {written} events to series {} (version {version})",
        series.uuid
    );

    Ok(WriteOutcome { written, version })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_go_to_the_decimal_column() {
        let [decimal, text] = value_params(&ObservationValue::Number(1.5));
        assert!(matches!(decimal, DatabaseValue::Real64(v) if (v - 1.5).abs() < f64::EPSILON));
        assert!(matches!(text, DatabaseValue::Null));
    }

    #[test]
    fn text_goes_to_the_text_column() {
        let [decimal, text] = value_params(&ObservationValue::Text("ok".to_string()));
        assert!(matches!(decimal, DatabaseValue::Null));
        assert!(matches!(text, DatabaseValue::String(ref s) if s == "ok"));
    }
}
