//! Conversion between `GeoJSON` geometry objects and WKT.
//!
//! Only `Point` and `MultiPolygon` are recognized. Polygon, ring, and point
//! order is preserved exactly; no coordinate validation (range, ring
//! closure) happens here. Anything the store or the join cannot use is
//! rejected downstream.

use std::fmt::Write as _;

use geo::{Geometry, MultiPolygon, Point};
use wkt::TryFromWkt;

use crate::GeometryError;

/// Rings of `(x, y)` pairs, grouped per polygon.
type PolygonCoords = Vec<Vec<(f64, f64)>>;

/// Converts a `GeoJSON` geometry object into WKT.
///
/// Returns `None` for null, missing or unsupported geometries, and for
/// structurally malformed ones: a position that is not an array of at
/// least two numbers anywhere in the coordinates rejects the whole
/// geometry. Partial polygons are never emitted, since a dropped ring or
/// position would silently change containment. Callers treat `None` as
/// "unlocated", not as an error.
#[must_use]
pub fn normalize(geometry: &serde_json::Value) -> Option<String> {
    let kind = geometry.get("type")?.as_str()?;
    let coordinates = geometry.get("coordinates")?;

    match kind {
        "Point" => {
            let (x, y) = position(coordinates)?;
            Some(point_wkt(x, y))
        }
        "MultiPolygon" => {
            let polygons = coordinates
                .as_array()?
                .iter()
                .map(|polygon| {
                    polygon
                        .as_array()?
                        .iter()
                        .map(|ring| ring.as_array()?.iter().map(position).collect())
                        .collect::<Option<PolygonCoords>>()
                })
                .collect::<Option<Vec<_>>>()?;
            Some(multi_polygon_wkt(&polygons))
        }
        other => {
            log::debug!("Unsupported geometry type {other:?}, leaving unlocated");
            None
        }
    }
}

/// Reads an `[x, y, ...]` position. Extra ordinates (elevation) are ignored.
fn position(value: &serde_json::Value) -> Option<(f64, f64)> {
    let coords = value.as_array()?;
    let x = coords.first()?.as_f64()?;
    let y = coords.get(1)?.as_f64()?;
    Some((x, y))
}

/// Formats a single point as `POINT(x y)`.
#[must_use]
pub fn point_wkt(x: f64, y: f64) -> String {
    format!("POINT({x} {y})")
}

fn multi_polygon_wkt(polygons: &[PolygonCoords]) -> String {
    let mut out = String::from("MULTIPOLYGON(");
    for (p, rings) in polygons.iter().enumerate() {
        if p > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for (r, ring) in rings.iter().enumerate() {
            if r > 0 {
                out.push_str(", ");
            }
            out.push('(');
            for (i, (x, y)) in ring.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{x} {y}");
            }
            out.push(')');
        }
        out.push(')');
    }
    out.push(')');
    out
}

/// Parses WKT into a geometry.
///
/// # Errors
///
/// Returns [`GeometryError::Wkt`] if the text is not valid WKT.
pub fn parse(wkt_text: &str) -> Result<Geometry<f64>, GeometryError> {
    Geometry::<f64>::try_from_wkt_str(wkt_text).map_err(|e| GeometryError::Wkt {
        message: e.to_string(),
    })
}

/// Parses WKT that must describe a single point.
///
/// # Errors
///
/// Returns [`GeometryError`] if the text is not valid WKT or is not a point.
pub fn parse_point(wkt_text: &str) -> Result<Point<f64>, GeometryError> {
    match parse(wkt_text)? {
        Geometry::Point(point) => Ok(point),
        other => Err(GeometryError::Unsupported {
            expected: "Point",
            found: kind_name(&other),
        }),
    }
}

/// Parses WKT describing a polygon or multi-polygon into a
/// [`MultiPolygon`].
///
/// # Errors
///
/// Returns [`GeometryError`] if the text is not valid WKT or is another
/// geometry kind.
pub fn parse_multi_polygon(wkt_text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    match parse(wkt_text)? {
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        other => Err(GeometryError::Unsupported {
            expected: "MultiPolygon",
            found: kind_name(&other),
        }),
    }
}

/// Formats a parsed geometry back into WKT.
///
/// Only points and multi-polygons are supported; other kinds return `None`.
#[must_use]
pub fn to_wkt(geometry: &Geometry<f64>) -> Option<String> {
    match geometry {
        Geometry::Point(point) => Some(point_wkt(point.x(), point.y())),
        Geometry::MultiPolygon(mp) => {
            let polygons: Vec<PolygonCoords> = mp
                .0
                .iter()
                .map(|polygon| {
                    std::iter::once(polygon.exterior())
                        .chain(polygon.interiors())
                        .map(|ring| ring.coords().map(|c| (c.x, c.y)).collect())
                        .collect()
                })
                .collect();
            Some(multi_polygon_wkt(&polygons))
        }
        _ => None,
    }
}

const fn kind_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
