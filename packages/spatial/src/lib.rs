#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geometry helpers for dd-node locations.
//!
//! Location geometries are stored as 3D `GeoJSON`. Incoming geometries may be
//! 2D, so they are coerced with [`force_3d`] before they reach the database.
//! Also parses the `in_bbox` list filter into a [`geo::Rect`].

use geo::{Coord, Rect};
use geojson::{GeoJson, Geometry, Value};
use thiserror::Error;

/// Errors produced while reading or coercing geometries.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The input is not valid `GeoJSON`.
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    /// The input is `GeoJSON`, but not a bare geometry.
    #[error("Expected a GeoJSON geometry, got a {0}")]
    NotAGeometry(&'static str),

    /// A position with fewer than two coordinates.
    #[error("Invalid position: expected at least 2 coordinates, got {0}")]
    InvalidPosition(usize),

    /// A malformed bounding box filter.
    #[error("Invalid bounding box '{0}': expected min_x,min_y,max_x,max_y")]
    InvalidBoundingBox(String),
}

/// Parses a `GeoJSON` geometry from its JSON value.
///
/// # Errors
///
/// Returns [`GeometryError`] if the value is not a geometry object.
pub fn parse_geometry(value: serde_json::Value) -> Result<Geometry, GeometryError> {
    match GeoJson::from_json_value(value)? {
        GeoJson::Geometry(geometry) => Ok(geometry),
        GeoJson::Feature(_) => Err(GeometryError::NotAGeometry("Feature")),
        GeoJson::FeatureCollection(_) => Err(GeometryError::NotAGeometry("FeatureCollection")),
    }
}

fn visit_positions<F>(value: &mut Value, f: &mut F) -> Result<(), GeometryError>
where
    F: FnMut(&mut Vec<f64>) -> Result<(), GeometryError>,
{
    match value {
        Value::Point(p) => f(p),
        Value::MultiPoint(ps) | Value::LineString(ps) => ps.iter_mut().try_for_each(&mut *f),
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines
            .iter_mut()
            .flatten()
            .try_for_each(&mut *f),
        Value::MultiPolygon(polygons) => polygons
            .iter_mut()
            .flatten()
            .flatten()
            .try_for_each(&mut *f),
        Value::GeometryCollection(geometries) => geometries
            .iter_mut()
            .try_for_each(|g| visit_positions(&mut g.value, f)),
    }
}

/// Whether `f` holds for every position, stopping at the first miss.
fn all_positions<F>(value: &Value, f: &mut F) -> bool
where
    F: FnMut(&[f64]) -> bool,
{
    match value {
        Value::Point(p) => f(p),
        Value::MultiPoint(ps) | Value::LineString(ps) => ps.iter().all(|p| f(p)),
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter().flatten().all(|p| f(p))
        }
        Value::MultiPolygon(polygons) => polygons.iter().flatten().flatten().all(|p| f(p)),
        Value::GeometryCollection(geometries) => {
            geometries.iter().all(|g| all_positions(&g.value, f))
        }
    }
}

/// Adds `z = 0.0` to every position that lacks one.
///
/// Recurses through geometry collections. 3D positions are left untouched,
/// so the operation is idempotent.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidPosition`] for positions with fewer than
/// two coordinates.
pub fn force_3d(mut geometry: Geometry) -> Result<Geometry, GeometryError> {
    visit_positions(&mut geometry.value, &mut |p| match p.len() {
        0 | 1 => Err(GeometryError::InvalidPosition(p.len())),
        2 => {
            p.push(0.0);
            Ok(())
        }
        _ => Ok(()),
    })?;
    geometry.bbox = None;
    Ok(geometry)
}

/// Whether every position of the geometry carries a `z` coordinate.
///
/// An empty geometry has no 2D positions and is reported as 3D.
#[must_use]
pub fn has_z(geometry: &Geometry) -> bool {
    all_positions(&geometry.value, &mut |p| p.len() >= 3)
}

/// Parses an `in_bbox` filter (`min_x,min_y,max_x,max_y`).
///
/// # Errors
///
/// Returns [`GeometryError::InvalidBoundingBox`] unless the input holds
/// exactly four finite numbers.
pub fn parse_bounding_box(param: &str) -> Result<Rect<f64>, GeometryError> {
    let invalid = || GeometryError::InvalidBoundingBox(param.to_string());

    let coords = param
        .split(',')
        .map(|c| c.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(invalid)?;

    let [min_x, min_y, max_x, max_y] = coords[..] else {
        return Err(invalid());
    };

    Ok(Rect::new(
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: max_y },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(json: serde_json::Value) -> Geometry {
        parse_geometry(json).unwrap()
    }

    #[test]
    fn force_3d_adds_zero_z_to_points() {
        let g = force_3d(geometry(serde_json::json!({
            "type": "Point",
            "coordinates": [5.1, 52.0]
        })))
        .unwrap();
        assert_eq!(g.value, Value::Point(vec![5.1, 52.0, 0.0]));
        assert!(has_z(&g));
    }

    #[test]
    fn force_3d_keeps_existing_z() {
        let g = force_3d(geometry(serde_json::json!({
            "type": "LineString",
            "coordinates": [[0.0, 0.0, 3.0], [1.0, 1.0]]
        })))
        .unwrap();
        assert_eq!(
            g.value,
            Value::LineString(vec![vec![0.0, 0.0, 3.0], vec![1.0, 1.0, 0.0]])
        );
    }

    #[test]
    fn force_3d_is_idempotent() {
        let once = force_3d(geometry(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        })))
        .unwrap();
        let twice = force_3d(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn force_3d_recurses_into_collections() {
        let g = force_3d(geometry(serde_json::json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [1.0, 2.0]},
                {"type": "MultiPoint", "coordinates": [[3.0, 4.0]]}
            ]
        })))
        .unwrap();
        assert!(has_z(&g));
    }

    #[test]
    fn has_z_spots_a_2d_position_anywhere_in_a_collection() {
        let g = geometry(serde_json::json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [1.0, 2.0, 3.0]},
                {"type": "MultiPolygon", "coordinates": [
                    [[[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0], [0.0, 0.0, 1.0]]]
                ]}
            ]
        }));
        assert!(!has_z(&g));
        assert!(has_z(&force_3d(g).unwrap()));
        assert!(has_z(&geometry(serde_json::json!({
            "type": "GeometryCollection",
            "geometries": []
        }))));
    }

    #[test]
    fn features_are_not_geometries() {
        let result = parse_geometry(serde_json::json!({
            "type": "Feature",
            "geometry": null,
            "properties": {}
        }));
        assert!(matches!(result, Err(GeometryError::NotAGeometry("Feature"))));
    }

    #[test]
    fn parses_bounding_box() {
        let rect = parse_bounding_box("4.0, 51.5,5.5,52.5").unwrap();
        assert!((rect.min().x - 4.0).abs() < f64::EPSILON);
        assert!((rect.max().y - 52.5).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_malformed_bounding_box() {
        assert!(parse_bounding_box("1,2,3").is_err());
        assert!(parse_bounding_box("1,2,3,x").is_err());
        assert!(parse_bounding_box("1,2,3,4,5").is_err());
        assert!(parse_bounding_box("").is_err());
    }
}
