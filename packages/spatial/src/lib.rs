#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for district attribution.
//!
//! The store keeps geometries as WKT text with no spatial predicates, so
//! point-in-polygon containment is computed here: district polygons are
//! parsed once into an R-tree and every incident point is looked up
//! against it. The [`join`] module combines the district lookup with the
//! date-keyed weather lookup.

pub mod join;
pub mod normalize;

use accident_map_incident_models::District;
use geo::{Contains, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Errors produced while interpreting stored geometry text.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The text is not valid WKT.
    #[error("Invalid WKT: {message}")]
    Wkt {
        /// Parser error description.
        message: String,
    },

    /// The WKT is valid but describes the wrong kind of geometry.
    #[error("Unsupported geometry: expected {expected}, found {found}")]
    Unsupported {
        /// Geometry kind the caller needed.
        expected: &'static str,
        /// Geometry kind that was parsed.
        found: &'static str,
    },
}

/// A district polygon stored in the R-tree with its name.
struct DistrictEntry {
    name: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for DistrictEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built R-tree over district polygons.
pub struct DistrictIndex {
    districts: RTree<DistrictEntry>,
}

impl DistrictIndex {
    /// Parses district geometries and bulk-loads them into an R-tree.
    ///
    /// Districts with missing or unparseable geometry are skipped with a
    /// warning; they can never contain an incident.
    #[must_use]
    pub fn from_districts(districts: &[District]) -> Self {
        let mut entries = Vec::with_capacity(districts.len());

        for district in districts {
            let Some(wkt) = district.geometry.as_deref() else {
                log::warn!("District {:?} has no geometry, skipping", district.name);
                continue;
            };

            let polygon = match normalize::parse_multi_polygon(wkt) {
                Ok(polygon) => polygon,
                Err(e) => {
                    log::warn!("Failed to parse geometry for district {:?}: {e}", district.name);
                    continue;
                }
            };

            let envelope = compute_envelope(&polygon);
            entries.push(DistrictEntry {
                name: district.name.clone(),
                envelope,
                polygon,
            });
        }

        let districts = RTree::bulk_load(entries);
        log::info!("Loaded {} districts into spatial index", districts.size());

        Self { districts }
    }

    /// Number of indexed districts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.districts.size()
    }

    /// Whether no district was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.districts.size() == 0
    }

    /// Look up the district containing a point.
    ///
    /// Districts may overlap; the lexically smallest name among all
    /// containing districts wins so the result does not depend on load
    /// order. Points on a district boundary are not contained.
    #[must_use]
    pub fn lookup(&self, lon: f64, lat: f64) -> Option<&str> {
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        self.districts
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.name.as_str())
            .min()
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
