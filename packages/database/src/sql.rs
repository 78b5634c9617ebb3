//! Incremental construction of parameterised SQL.

use switchy_database::DatabaseValue;

/// Accumulates SQL text and its positional parameters.
///
/// Clauses are written with `?` placeholders, which are rewritten to the
/// next `$n` as their values are bound.
#[derive(Debug, Default)]
pub(crate) struct SqlBuilder {
    pub(crate) sql: String,
    pub(crate) params: Vec<DatabaseValue>,
}

impl SqlBuilder {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            sql: base.to_string(),
            params: Vec::new(),
        }
    }

    /// Appends raw SQL without parameters.
    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Appends `clause`, binding one value per `?` in order.
    pub(crate) fn bind(
        &mut self,
        clause: &str,
        values: impl IntoIterator<Item = DatabaseValue>,
    ) -> &mut Self {
        let mut values = values.into_iter();
        for (i, part) in clause.split('?').enumerate() {
            if i > 0 {
                if let Some(value) = values.next() {
                    self.params.push(value);
                }
                self.sql.push('$');
                self.sql.push_str(&self.params.len().to_string());
            }
            self.sql.push_str(part);
        }
        self
    }

    /// Appends ` AND <clause>` with its bound values.
    pub(crate) fn and(
        &mut self,
        clause: &str,
        values: impl IntoIterator<Item = DatabaseValue>,
    ) -> &mut Self {
        self.push(" AND ").bind(clause, values)
    }

    /// Appends ` AND <column> IN (...)` for the given values, or a clause that
    /// matches nothing when there are none.
    pub(crate) fn and_in(&mut self, column: &str, values: Vec<DatabaseValue>) -> &mut Self {
        if values.is_empty() {
            return self.push(" AND FALSE");
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.and(&format!("{column} IN ({placeholders})"), values)
    }

    /// Starts an `UPDATE` of the row `id` that bumps its `version` and sets
    /// `last_modified`. Each assignment is a `column = ?` clause with its
    /// value. With `expected_version` only that version matches, so a stale
    /// token updates no row.
    pub(crate) fn versioned_update(
        table: &str,
        id: i64,
        assignments: Vec<(&str, DatabaseValue)>,
        expected_version: Option<i64>,
    ) -> Self {
        let mut b = Self::new(&format!(
            "UPDATE {table} SET version = version + 1, last_modified = NOW()"
        ));
        for (clause, value) in assignments {
            b.push(", ").bind(clause, [value]);
        }
        b.push(" WHERE 1=1").and("id = ?", [DatabaseValue::Int64(id)]);
        if let Some(expected) = expected_version {
            b.and("version = ?", [DatabaseValue::Int64(expected)]);
        }
        b
    }

    /// Appends `LIMIT` / `OFFSET` for a page.
    pub(crate) fn page(&mut self, page: dd_node_database_models::Page) -> &mut Self {
        if let Some(limit) = page.limit {
            self.bind(" LIMIT ?", [DatabaseValue::Int64(saturating_i64(limit))]);
        }
        if page.offset > 0 {
            self.bind(" OFFSET ?", [DatabaseValue::Int64(saturating_i64(page.offset))]);
        }
        self
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Binds an optional string, `NULL` when absent.
pub(crate) fn optional_text(value: Option<&String>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |v| DatabaseValue::String(v.clone()))
}

/// Builds an `ILIKE` pattern matching `term` anywhere, with the pattern's
/// wildcard characters escaped.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
