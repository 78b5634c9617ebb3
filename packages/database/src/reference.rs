//! Reference tables and nested domain tables.
//!
//! Reference tables (observation types, data sources, timeseries types,
//! nodes, domains) are read generically from a [`ReferenceTable`]
//! description, each row rendered as a JSON object.

use dd_node_database_models::{
    ColumnKind, DomainTableRow, DomainValueRow, Page, Paged, ReferenceColumn, ReferenceTable,
};
use moosicbox_json_utils::database::ToValue as _;
use serde_json::{Map, Value};
use switchy_database::{Database, DatabaseValue};

use crate::DbError;
use crate::rows::timestamp_column;
use crate::sql::{SqlBuilder, contains_pattern};

/// A reference row rendered as a JSON object.
pub type ReferenceRecord = Map<String, Value>;

fn select_expression(column: &ReferenceColumn) -> String {
    let name = column.name;
    match column.kind {
        ColumnKind::Text | ColumnKind::Bool | ColumnKind::Timestamp => name.to_string(),
        ColumnKind::Integer | ColumnKind::Choice(_) => format!("{name}::BIGINT AS {name}"),
        ColumnKind::Uuid => format!("{name}::text AS {name}"),
    }
}

fn select_sql(table: &ReferenceTable) -> String {
    let columns = table
        .columns
        .iter()
        .map(select_expression)
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {columns} FROM {} WHERE 1=1", table.table)
}

fn decode_column(row: &switchy_database::Row, column: &ReferenceColumn) -> Value {
    let name = column.name;
    match column.kind {
        ColumnKind::Text | ColumnKind::Uuid => row
            .to_value::<Option<String>>(name)
            .unwrap_or(None)
            .map_or(Value::Null, Value::String),
        ColumnKind::Integer => row
            .to_value::<Option<i64>>(name)
            .unwrap_or(None)
            .map_or(Value::Null, Value::from),
        ColumnKind::Bool => row
            .to_value::<Option<bool>>(name)
            .unwrap_or(None)
            .map_or(Value::Null, Value::Bool),
        ColumnKind::Timestamp => timestamp_column(row, name)
            .map_or(Value::Null, |dt| Value::from(dt.timestamp_millis())),
        ColumnKind::Choice(label) => row
            .to_value::<Option<i64>>(name)
            .unwrap_or(None)
            .map_or(Value::Null, |code| {
                label(code).map_or_else(|| Value::from(code), |l| Value::String(l.to_string()))
            }),
    }
}

fn row_to_record(row: &switchy_database::Row, table: &ReferenceTable) -> ReferenceRecord {
    table
        .columns
        .iter()
        .map(|c| (c.name.to_string(), decode_column(row, c)))
        .collect()
}

/// Lists rows of a reference table, optionally filtered by a partial match
/// on its search columns.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn list_reference(
    db: &dyn Database,
    table: &ReferenceTable,
    search: Option<&str>,
    page: Page,
) -> Result<Paged<ReferenceRecord>, DbError> {
    let apply_search = |b: &mut SqlBuilder| {
        if let Some(term) = search.filter(|_| !table.search_columns.is_empty()) {
            let pattern = contains_pattern(term);
            let clause = table
                .search_columns
                .iter()
                .map(|c| format!("{c} ILIKE ?"))
                .collect::<Vec<_>>()
                .join(" OR ");
            b.and(
                &format!("({clause})"),
                table
                    .search_columns
                    .iter()
                    .map(|_| DatabaseValue::String(pattern.clone())),
            );
        }
    };

    let mut count = SqlBuilder::new(&format!(
        "SELECT COUNT(*) AS count FROM {} WHERE 1=1",
        table.table
    ));
    apply_search(&mut count);
    let rows = db.query_raw_params(&count.sql, &count.params).await?;
    let total: i64 = rows
        .first()
        .and_then(|r| r.to_value("count").ok())
        .unwrap_or(0);

    let mut select = SqlBuilder::new(&select_sql(table));
    apply_search(&mut select);
    select.push(&format!(" ORDER BY {}", table.order_by));
    select.page(page);

    let rows = db.query_raw_params(&select.sql, &select.params).await?;

    Ok(Paged {
        count: u64::try_from(total).unwrap_or(0),
        rows: rows.iter().map(|r| row_to_record(r, table)).collect(),
    })
}

/// Gets a single reference row by its lookup column.
///
/// Integer lookups that do not parse never match.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn get_reference(
    db: &dyn Database,
    table: &ReferenceTable,
    key: &str,
) -> Result<Option<ReferenceRecord>, DbError> {
    let lookup = table.lookup;
    let mut select = SqlBuilder::new(&select_sql(table));

    match lookup.kind {
        ColumnKind::Integer | ColumnKind::Choice(_) => {
            let Ok(id) = key.parse::<i64>() else {
                return Ok(None);
            };
            select.and(&format!("{} = ?", lookup.name), [DatabaseValue::Int64(id)]);
        }
        ColumnKind::Uuid => {
            select.and(
                &format!("{}::text = ?", lookup.name),
                [DatabaseValue::String(key.to_ascii_lowercase())],
            );
        }
        ColumnKind::Text | ColumnKind::Bool | ColumnKind::Timestamp => {
            let clause = if table.lookup_ignores_case {
                format!("LOWER({}) = LOWER(?)", lookup.name)
            } else {
                format!("{} = ?", lookup.name)
            };
            select.and(&clause, [DatabaseValue::String(key.to_string())]);
        }
    }
    select.push(" LIMIT 1");

    let rows = db.query_raw_params(&select.sql, &select.params).await?;
    Ok(rows.first().map(|r| row_to_record(r, table)))
}

async fn domain_id(db: &dyn Database, domain: &str) -> Result<Option<i64>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT id FROM domains WHERE LOWER(name) = LOWER($1)",
            &[DatabaseValue::String(domain.to_string())],
        )
        .await?;
    Ok(rows.first().and_then(|r| r.to_value("id").ok()))
}

/// Lists the tables of a domain, matched by name case-insensitively.
///
/// Returns `None` when the domain does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn list_domain_tables(
    db: &dyn Database,
    domain: &str,
) -> Result<Option<Vec<DomainTableRow>>, DbError> {
    let Some(id) = domain_id(db, domain).await? else {
        return Ok(None);
    };

    let rows = db
        .query_raw_params(
            "SELECT name, rest_sync_url, last_synced
             FROM domain_tables
             WHERE domain_id = $1
             ORDER BY name",
            &[DatabaseValue::Int64(id)],
        )
        .await?;

    Ok(Some(
        rows.iter()
            .map(|row| DomainTableRow {
                name: row.to_value("name").unwrap_or_default(),
                rest_sync_url: row.to_value("rest_sync_url").unwrap_or(None),
                last_synced: timestamp_column(row, "last_synced"),
            })
            .collect(),
    ))
}

/// Lists the values of a domain table. Domain and table names are matched
/// case-insensitively.
///
/// Returns `None` when the domain or the table does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn list_domain_values(
    db: &dyn Database,
    domain: &str,
    table: &str,
) -> Result<Option<Vec<DomainValueRow>>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT dt.id
             FROM domain_tables dt
             JOIN domains d ON dt.domain_id = d.id
             WHERE LOWER(d.name) = LOWER($1) AND LOWER(dt.name) = LOWER($2)",
            &[
                DatabaseValue::String(domain.to_string()),
                DatabaseValue::String(table.to_string()),
            ],
        )
        .await?;
    let Some(table_id) = rows.first().and_then(|r| r.to_value::<i64>("id").ok()) else {
        return Ok(None);
    };

    let rows = db
        .query_raw_params(
            "SELECT code, description, begin_date, end_date, value_category
             FROM domain_values
             WHERE domain_table_id = $1
             ORDER BY code",
            &[DatabaseValue::Int64(table_id)],
        )
        .await?;

    Ok(Some(
        rows.iter()
            .map(|row| DomainValueRow {
                code: row.to_value("code").unwrap_or_default(),
                description: row.to_value("description").unwrap_or_default(),
                begin_date: timestamp_column(row, "begin_date"),
                end_date: timestamp_column(row, "end_date"),
                value_category: row.to_value("value_category").unwrap_or(None),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn scale_label(code: i64) -> Option<&'static str> {
        match code {
            0 => Some("nominal"),
            _ => None,
        }
    }

    const COLUMNS: &[ReferenceColumn] = &[
        ReferenceColumn::new("id", ColumnKind::Integer),
        ReferenceColumn::new("uuid", ColumnKind::Uuid),
        ReferenceColumn::new("code", ColumnKind::Text),
        ReferenceColumn::new("scale", ColumnKind::Choice(scale_label)),
    ];

    const TABLE: ReferenceTable = ReferenceTable {
        table: "things",
        lookup: ReferenceColumn::new("code", ColumnKind::Text),
        lookup_ignores_case: true,
        order_by: "code",
        columns: COLUMNS,
        search_columns: &["code"],
    };

    #[test]
    fn selects_columns_with_casts() {
        assert_eq!(
            select_sql(&TABLE),
            "SELECT id::BIGINT AS id, uuid::text AS uuid, code, scale::BIGINT AS scale \
             FROM things WHERE 1=1"
        );
    }
}
