//! Reference tables served by the generic list and detail handlers.

use dd_node_database_models::{ColumnKind, ReferenceColumn, ReferenceTable};
use dd_node_timeseries_models::ValueScale;

fn scale_label(code: i64) -> Option<&'static str> {
    let code = i16::try_from(code).ok()?;
    ValueScale::from_code(code).ok().map(ValueScale::label)
}

pub const OBSERVATION_TYPES: ReferenceTable = ReferenceTable {
    table: "observation_types",
    lookup: ReferenceColumn::new("id", ColumnKind::Integer),
    lookup_ignores_case: false,
    order_by: "code, id",
    columns: &[
        ReferenceColumn::new("id", ColumnKind::Integer),
        ReferenceColumn::new("code", ColumnKind::Text),
        ReferenceColumn::new("parameter", ColumnKind::Text),
        ReferenceColumn::new("unit", ColumnKind::Text),
        ReferenceColumn::new("reference_frame", ColumnKind::Text),
        ReferenceColumn::new("compartment", ColumnKind::Text),
        ReferenceColumn::new("description", ColumnKind::Text),
        ReferenceColumn::new("scale", ColumnKind::Choice(scale_label)),
    ],
    search_columns: &["code", "parameter", "description"],
};

pub const DATA_SOURCES: ReferenceTable = ReferenceTable {
    table: "data_sources",
    lookup: ReferenceColumn::new("uuid", ColumnKind::Uuid),
    lookup_ignores_case: false,
    order_by: "name, id",
    columns: &[
        ReferenceColumn::new("uuid", ColumnKind::Uuid),
        ReferenceColumn::new("name", ColumnKind::Text),
    ],
    search_columns: &["name"],
};

pub const TIMESERIES_TYPES: ReferenceTable = ReferenceTable {
    table: "timeseries_types",
    lookup: ReferenceColumn::new("id", ColumnKind::Integer),
    lookup_ignores_case: false,
    order_by: "code, id",
    columns: &[
        ReferenceColumn::new("id", ColumnKind::Integer),
        ReferenceColumn::new("code", ColumnKind::Text),
        ReferenceColumn::new("name", ColumnKind::Text),
    ],
    search_columns: &["code", "name"],
};

pub const NODES: ReferenceTable = ReferenceTable {
    table: "nodes",
    lookup: ReferenceColumn::new("id", ColumnKind::Integer),
    lookup_ignores_case: false,
    order_by: "id",
    columns: &[
        ReferenceColumn::new("id", ColumnKind::Integer),
        ReferenceColumn::new("uuid", ColumnKind::Uuid),
        ReferenceColumn::new("name", ColumnKind::Text),
        ReferenceColumn::new("description", ColumnKind::Text),
        ReferenceColumn::new("base_url", ColumnKind::Text),
        ReferenceColumn::new("master", ColumnKind::Bool),
    ],
    search_columns: &["name"],
};

/// Domains are looked up by name, ignoring case.
pub const DOMAINS: ReferenceTable = ReferenceTable {
    table: "domains",
    lookup: ReferenceColumn::new("name", ColumnKind::Text),
    lookup_ignores_case: true,
    order_by: "name",
    columns: &[
        ReferenceColumn::new("name", ColumnKind::Text),
        ReferenceColumn::new("description", ColumnKind::Text),
    ],
    search_columns: &["name", "description"],
};
