//! Aligns several series of one location onto a shared time axis.

use std::collections::{BTreeMap, BTreeSet};

use dd_node_timeseries_models::{Observation, ObservationValue};
use serde::Serialize;

/// Metadata of a series column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    /// Column name (the series name).
    pub name: String,
    /// Column type (`timestamp` or the series' value type name).
    #[serde(rename = "type")]
    pub column_type: String,
    /// Physical quantity (`time` or `parameter`).
    pub quantity: String,
    /// Unit of the values, if known.
    pub unit: Option<String>,
}

/// Data of a single column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnData {
    /// The shared time axis.
    Timestamps(Vec<i64>),
    /// Values aligned to the time axis; `None` where the series has no value.
    Values(Vec<Option<ObservationValue>>),
}

impl ColumnData {
    /// Number of rows in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Timestamps(v) => v.len(),
            Self::Values(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named column of the unified time dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Column metadata.
    #[serde(flatten)]
    pub meta: ColumnMeta,
    /// Column rows.
    pub data: ColumnData,
}

/// One input series: its column metadata and its observations.
#[derive(Debug, Clone)]
pub struct SeriesColumn {
    /// Metadata of the output column.
    pub meta: ColumnMeta,
    /// Observations of the series, in any order.
    pub observations: Vec<Observation>,
}

/// Builds the unified time dimension for a set of series.
///
/// The first column holds the sorted union of all timestamps. Every other
/// column holds one value per axis row, `None` where the series has no
/// observation at that timestamp. `NaN` values are reported as `None`.
#[must_use]
pub fn unify(series: &[SeriesColumn]) -> Vec<Column> {
    let axis = series
        .iter()
        .flat_map(|s| s.observations.iter().map(|o| o.timestamp))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();

    let mut columns = Vec::with_capacity(series.len() + 1);

    columns.push(Column {
        meta: ColumnMeta {
            name: "timestamp".to_string(),
            column_type: "timestamp".to_string(),
            quantity: "time".to_string(),
            unit: Some("ms".to_string()),
        },
        data: ColumnData::Timestamps(axis.clone()),
    });

    for s in series {
        let by_timestamp = s
            .observations
            .iter()
            .filter(|o| !o.value.is_nan())
            .map(|o| (o.timestamp, &o.value))
            .collect::<BTreeMap<_, _>>();

        let values = axis
            .iter()
            .map(|ts| by_timestamp.get(ts).map(|v| (*v).clone()))
            .collect();

        columns.push(Column {
            meta: s.meta.clone(),
            data: ColumnData::Values(values),
        });
    }

    log::trace!("unify: {} series, {} rows", series.len(), axis.len());

    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> ColumnMeta {
        ColumnMeta {
            name: name.to_string(),
            column_type: "float".to_string(),
            quantity: "parameter".to_string(),
            unit: Some("m".to_string()),
        }
    }

    #[test]
    fn aligns_series_to_union_of_timestamps() {
        let columns = unify(&[
            SeriesColumn {
                meta: meta("a"),
                observations: vec![Observation::number(20, 2.0), Observation::number(10, 1.0)],
            },
            SeriesColumn {
                meta: meta("b"),
                observations: vec![Observation::number(15, 5.0), Observation::number(20, 6.0)],
            },
        ]);

        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].data, ColumnData::Timestamps(vec![10, 15, 20]));
        assert_eq!(
            columns[1].data,
            ColumnData::Values(vec![
                Some(ObservationValue::Number(1.0)),
                None,
                Some(ObservationValue::Number(2.0)),
            ])
        );
        assert_eq!(
            columns[2].data,
            ColumnData::Values(vec![
                None,
                Some(ObservationValue::Number(5.0)),
                Some(ObservationValue::Number(6.0)),
            ])
        );
        assert!(columns.iter().all(|c| c.data.len() == 3));
    }

    #[test]
    fn nan_becomes_null() {
        let columns = unify(&[SeriesColumn {
            meta: meta("a"),
            observations: vec![Observation::number(1, f64::NAN)],
        }]);
        assert_eq!(columns[1].data, ColumnData::Values(vec![None]));
    }

    #[test]
    fn no_series_yields_empty_time_column() {
        let columns = unify(&[]);
        assert_eq!(columns.len(), 1);
        assert!(columns[0].data.is_empty());
    }

    #[test]
    fn serializes_flat_columns() {
        let columns = unify(&[SeriesColumn {
            meta: meta("a"),
            observations: vec![Observation::number(1, 0.5)],
        }]);
        let json = serde_json::to_value(&columns).unwrap();
        assert_eq!(json[0]["type"], "timestamp");
        assert_eq!(json[0]["data"], serde_json::json!([1]));
        assert_eq!(json[1]["name"], "a");
        assert_eq!(json[1]["data"], serde_json::json!([0.5]));
    }
}
