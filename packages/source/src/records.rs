//! Extraction of typed rows from flattened records.
//!
//! Attribute names follow the City of Calgary open data exports: traffic
//! incidents carry `id`, `start_dt`, `modified_dt` and either a `geometry`
//! (from `GeoJSON`) or `longitude`/`latitude`; community boundaries carry
//! `name` and either `geometry` or `multipolygon`.

use accident_map_incident_models::{District, Incident};
use accident_map_spatial::normalize::{parse_multi_polygon, parse_point, point_wkt};
use serde_json::Value;

use crate::flatten::{FlatRecord, GEOMETRY_ATTR};
use crate::parsing::{f64_attr, string_attr, timestamp_attr};

/// Rows extracted from a batch, plus how many records were unusable.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    /// Successfully extracted rows.
    pub rows: Vec<T>,
    /// Records skipped because a required attribute was missing.
    pub skipped: usize,
}

/// Extracts incidents from flattened traffic records.
///
/// Records without an identifier or a last-modified timestamp are skipped:
/// they cannot be upserted by recency. A `geometry` attribute is used only
/// when it holds point WKT; otherwise `longitude`/`latitude` are tried, and
/// if neither yields a point the incident is unlocated.
#[must_use]
pub fn incidents_from_records(records: &[FlatRecord]) -> Extracted<Incident> {
    let mut rows = Vec::with_capacity(records.len());
    let mut skipped = 0usize;

    for record in records {
        let Some(id) = string_attr(record.get("id")) else {
            skipped += 1;
            continue;
        };
        let Some(modified_at) = timestamp_attr(record.get("modified_dt")) else {
            log::debug!("Incident {id} has no usable modified_dt, skipping");
            skipped += 1;
            continue;
        };

        rows.push(Incident {
            id,
            occurred_at: timestamp_attr(record.get("start_dt")),
            modified_at,
            geometry: incident_geometry(record),
        });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} traffic records missing id or modified_dt");
    }

    Extracted { rows, skipped }
}

fn incident_geometry(record: &FlatRecord) -> Option<String> {
    if let Some(Value::String(wkt)) = record.get(GEOMETRY_ATTR)
        && parse_point(wkt).is_ok()
    {
        return Some(wkt.clone());
    }

    let lon = f64_attr(record.get("longitude"))?;
    let lat = f64_attr(record.get("latitude"))?;
    Some(point_wkt(lon, lat))
}

/// Extracts districts from flattened boundary records.
///
/// Records without a name are skipped. The first of `geometry` and
/// `multipolygon` holding polygon WKT is used.
#[must_use]
pub fn districts_from_records(records: &[FlatRecord]) -> Extracted<District> {
    let mut rows = Vec::with_capacity(records.len());
    let mut skipped = 0usize;

    for record in records {
        let Some(name) = string_attr(record.get("name")) else {
            skipped += 1;
            continue;
        };

        let geometry = [GEOMETRY_ATTR, "multipolygon"]
            .iter()
            .find_map(|attr| match record.get(*attr) {
                Some(Value::String(wkt)) if parse_multi_polygon(wkt).is_ok() => {
                    Some(wkt.clone())
                }
                _ => None,
            });

        rows.push(District { name, geometry });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} boundary records without a name");
    }

    Extracted { rows, skipped }
}
