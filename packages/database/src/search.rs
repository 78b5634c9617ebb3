//! Case-insensitive search over locations, timeseries and observation types.

use dd_node_database_models::{SearchKind, SearchQuery, SearchRow};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;
use crate::rows::optional_uuid_column;
use crate::sql::{SqlBuilder, contains_pattern};

/// The `SELECT` producing search entries for one kind of entity.
///
/// Title is the name, the code or the id; description is the description or
/// the code.
const fn entries_sql(kind: SearchKind) -> &'static str {
    match kind {
        SearchKind::Location => {
            "SELECT 'location' AS kind, id AS entity_id, uuid::text AS entity_uuid,
                    COALESCE(NULLIF(name, ''), NULLIF(code, ''), id::text) AS title,
                    COALESCE(code, '') AS description,
                    ST_X(ST_Centroid(geometry)) AS x, ST_Y(ST_Centroid(geometry)) AS y
             FROM locations"
        }
        SearchKind::Timeseries => {
            "SELECT 'timeseries' AS kind, id AS entity_id, uuid::text AS entity_uuid,
                    COALESCE(NULLIF(name, ''), NULLIF(code, ''), id::text) AS title,
                    COALESCE(NULLIF(description, ''), code, '') AS description,
                    NULL::DOUBLE PRECISION AS x, NULL::DOUBLE PRECISION AS y
             FROM timeseries"
        }
        SearchKind::ObservationType => {
            "SELECT 'observationtype' AS kind, id AS entity_id, NULL::text AS entity_uuid,
                    COALESCE(NULLIF(code, ''), id::text) AS title,
                    COALESCE(NULLIF(description, ''), code, '') AS description,
                    NULL::DOUBLE PRECISION AS x, NULL::DOUBLE PRECISION AS y
             FROM observation_types"
        }
    }
}

/// Builds the search statement for the given kinds and optional term.
fn search_sql(kinds: &[SearchKind], term: Option<&str>) -> SqlBuilder {
    let union = kinds
        .iter()
        .map(|k| entries_sql(*k))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");

    match term {
        Some(term) => {
            let pattern = contains_pattern(term);
            let mut b = SqlBuilder::new("SELECT s.*, ");
            b.bind(
                "CASE WHEN s.title ILIKE ? THEN 2 WHEN s.description ILIKE ? THEN 1 END AS rank",
                [
                    DatabaseValue::String(pattern.clone()),
                    DatabaseValue::String(pattern.clone()),
                ],
            );
            b.push(&format!(" FROM ({union}) s WHERE 1=1"));
            b.and(
                "(s.title ILIKE ? OR s.description ILIKE ?)",
                [
                    DatabaseValue::String(pattern.clone()),
                    DatabaseValue::String(pattern),
                ],
            );
            b.push(" ORDER BY rank DESC, s.title, s.entity_id");
            b
        }
        None => SqlBuilder::new(&format!(
            "SELECT s.*, NULL::INTEGER AS rank FROM ({union}) s ORDER BY s.title, s.entity_id"
        )),
    }
}

fn row_to_search(row: &switchy_database::Row) -> Option<SearchRow> {
    let kind: String = row.to_value("kind").unwrap_or_default();
    Some(SearchRow {
        kind: kind.parse().ok()?,
        entity_id: row.to_value("entity_id").unwrap_or(0),
        entity_uuid: optional_uuid_column(row, "entity_uuid"),
        title: row.to_value("title").unwrap_or_default(),
        description: row.to_value("description").unwrap_or_default(),
        rank: row.to_value("rank").unwrap_or(None),
        x: row.to_value("x").unwrap_or(None),
        y: row.to_value("y").unwrap_or(None),
    })
}

/// Searches the requested kinds of entities.
///
/// Without a term and without kinds nothing is returned. Without a term but
/// with kinds, every entry of those kinds is returned unranked, ordered by
/// title. Hits whose url contains `/<exclude>` are dropped.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn search(db: &dyn Database, query: &SearchQuery) -> Result<Vec<SearchRow>, DbError> {
    let term = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    if term.is_none() && query.kinds.is_empty() {
        return Ok(Vec::new());
    }

    let kinds = if query.kinds.is_empty() {
        SearchKind::all()
    } else {
        query.kinds.as_slice()
    };

    let statement = search_sql(kinds, term);
    let rows = db
        .query_raw_params(&statement.sql, &statement.params)
        .await?;

    let excluded = query
        .exclude
        .iter()
        .map(|e| format!("/{e}"))
        .collect::<Vec<_>>();

    let hits = rows
        .iter()
        .filter_map(row_to_search)
        .filter(|hit| {
            let url = hit.url();
            !excluded.iter().any(|e| url.contains(e.as_str()))
        })
        .collect::<Vec<_>>();

    log::debug!("Search {term:?} in {kinds:?}: {} hits", hits.len());

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranked_search_binds_the_pattern_four_times() {
        let b = search_sql(&[SearchKind::Location], Some("dam"));
        assert_eq!(b.params.len(), 4);
        assert!(b.sql.contains("ORDER BY rank DESC"));
        assert!(b.sql.starts_with("SELECT s.*, CASE WHEN s.title ILIKE $1"));
    }

    #[test]
    fn unranked_listing_orders_by_title() {
        let b = search_sql(&[SearchKind::Timeseries, SearchKind::ObservationType], None);
        assert!(b.params.is_empty());
        assert!(b.sql.contains("NULL::INTEGER AS rank"));
        assert!(b.sql.contains("UNION ALL"));
        assert!(b.sql.ends_with("ORDER BY s.title, s.entity_id"));
    }
}
