#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Row types shared across the accident map pipeline.
//!
//! Raw relations ([`Incident`], [`District`], [`WeatherDay`]) are produced by
//! the source crate, enriched into [`JoinedIncident`] rows by the spatial
//! join, and persisted as [`Fact`] rows by the fact table synchronizer.
//!
//! Timestamps are wall-clock values as published by the source portal
//! (no timezone conversion), so the calendar date of an incident matches
//! the calendar date of the local weather observation.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A traffic incident as pulled from the upstream feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Upstream incident identifier, stable across refreshes.
    pub id: String,
    /// When the incident started. `None` if the feed omitted it.
    pub occurred_at: Option<NaiveDateTime>,
    /// Upstream last-modified timestamp. Drives upsert recency.
    pub modified_at: NaiveDateTime,
    /// Point geometry as WKT (`POINT(lon lat)`), or `None` if unlocated.
    pub geometry: Option<String>,
}

impl Incident {
    /// Calendar date of the occurrence timestamp.
    #[must_use]
    pub fn occurred_date(&self) -> Option<NaiveDate> {
        self.occurred_at.map(|dt| dt.date())
    }
}

/// A named community district polygon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    /// District name. Assumed unique for join purposes.
    pub name: String,
    /// Polygon or multi-polygon geometry as WKT.
    pub geometry: Option<String>,
}

/// Daily weather aggregates for a single calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherDay {
    /// Observation date.
    pub date: NaiveDate,
    /// Minimum temperature in degrees Celsius.
    pub min_temp_c: Option<f64>,
    /// Maximum temperature in degrees Celsius.
    pub max_temp_c: Option<f64>,
    /// Total precipitation in millimetres.
    pub total_precip_mm: Option<f64>,
}

/// Longitude/latitude pair (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
}

/// An incident enriched with its containing district and same-day weather.
///
/// One row exists per input incident regardless of whether either lookup
/// matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedIncident {
    /// Upstream incident identifier.
    pub incident_id: String,
    /// Calendar date the incident occurred on.
    pub occurred_date: Option<NaiveDate>,
    /// Upstream last-modified timestamp.
    pub modified_at: NaiveDateTime,
    /// Name of the containing district, if any.
    pub district_name: Option<String>,
    /// Weather observed on the occurrence date, if any.
    pub weather: Option<WeatherDay>,
    /// Point coordinates derived from the incident geometry.
    pub location: Option<Coordinates>,
    /// Incident geometry as WKT.
    pub geometry: Option<String>,
}

/// A row of the denormalized `accident_facts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Upsert key.
    pub incident_id: String,
    /// Calendar date the incident occurred on.
    pub occurred_date: Option<NaiveDate>,
    /// Greatest last-modified timestamp observed for this incident.
    pub modified_at: NaiveDateTime,
    /// Resolved community district.
    pub community_name: Option<String>,
    /// Date of the matched weather observation.
    pub weather_date: Option<NaiveDate>,
    /// Minimum temperature on the occurrence date.
    pub min_temp_c: Option<f64>,
    /// Maximum temperature on the occurrence date.
    pub max_temp_c: Option<f64>,
    /// Total precipitation on the occurrence date.
    pub total_precip_mm: Option<f64>,
    /// Incident longitude.
    pub accident_lon: Option<f64>,
    /// Incident latitude.
    pub accident_lat: Option<f64>,
    /// Incident geometry as WKT.
    pub accident_geom: Option<String>,
}

impl From<&JoinedIncident> for Fact {
    fn from(row: &JoinedIncident) -> Self {
        Self {
            incident_id: row.incident_id.clone(),
            occurred_date: row.occurred_date,
            modified_at: row.modified_at,
            community_name: row.district_name.clone(),
            weather_date: row.weather.map(|w| w.date),
            min_temp_c: row.weather.and_then(|w| w.min_temp_c),
            max_temp_c: row.weather.and_then(|w| w.max_temp_c),
            total_precip_mm: row.weather.and_then(|w| w.total_precip_mm),
            accident_lon: row.location.map(|c| c.lon),
            accident_lat: row.location.map(|c| c.lat),
            accident_geom: row.geometry.clone(),
        }
    }
}

/// What the synchronizer does with an incoming row.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FactTransition {
    /// No stored fact exists yet.
    Insert,
    /// The stored fact is strictly older than the incoming row.
    Update,
    /// The stored fact is as new or newer; the incoming row is dropped.
    Discard,
}

impl FactTransition {
    /// Classifies an incoming row against the stored last-modified
    /// timestamp (if any).
    #[must_use]
    pub fn classify(stored: Option<NaiveDateTime>, incoming: NaiveDateTime) -> Self {
        match stored {
            None => Self::Insert,
            Some(stored) if stored < incoming => Self::Update,
            Some(_) => Self::Discard,
        }
    }
}

/// A row carrying an identity and a last-modified timestamp.
pub trait Versioned {
    /// Identity key.
    fn key(&self) -> &str;
    /// Last-modified timestamp.
    fn modified_at(&self) -> NaiveDateTime;
}

impl Versioned for Incident {
    fn key(&self) -> &str {
        &self.id
    }

    fn modified_at(&self) -> NaiveDateTime {
        self.modified_at
    }
}

impl Versioned for JoinedIncident {
    fn key(&self) -> &str {
        &self.incident_id
    }

    fn modified_at(&self) -> NaiveDateTime {
        self.modified_at
    }
}

/// Collapses rows sharing a key to the one with the greatest last-modified
/// timestamp. Ties keep the first occurrence.
///
/// Output preserves the order in which each key was first seen.
#[must_use]
pub fn latest_by_key<T: Versioned>(rows: Vec<T>) -> Vec<T> {
    let mut winner: BTreeMap<String, usize> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        match winner.get(row.key()) {
            Some(&current) if rows[current].modified_at() >= row.modified_at() => {}
            _ => {
                winner.insert(row.key().to_string(), i);
            }
        }
    }

    rows.into_iter()
        .enumerate()
        .filter(|(i, row)| winner.get(row.key()) == Some(i))
        .map(|(_, row)| row)
        .collect()
}
