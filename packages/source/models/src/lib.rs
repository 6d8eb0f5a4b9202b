#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region and data feed configuration types.
//!
//! A [`RegionDefinition`] describes everything a refresh run needs to pull
//! for one municipality: the traffic incident feed, the community boundary
//! feed, and the weather station whose daily aggregates are joined to
//! incidents by date. Definitions are deserialized from TOML.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default per-source record limit applied when a region does not set one.
pub const DEFAULT_FETCH_LIMIT: u64 = 50_000;

/// The three upstream relations a refresh run pulls.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedKind {
    /// Traffic incidents.
    Traffic,
    /// Community district boundaries.
    Boundaries,
    /// Daily weather aggregates.
    Weather,
}

/// A municipality's data feeds, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionDefinition {
    /// Unique region identifier (e.g., `"calgary"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Per-source record limit. Defaults to [`DEFAULT_FETCH_LIMIT`].
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u64,
    /// Traffic incident feed.
    pub traffic: FeedConfig,
    /// Community boundary feed.
    pub boundaries: FeedConfig,
    /// Weather provider configuration.
    pub weather: WeatherConfig,
}

const fn default_fetch_limit() -> u64 {
    DEFAULT_FETCH_LIMIT
}

impl RegionDefinition {
    /// Returns the region identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable region name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// How to fetch a JSON or `GeoJSON` record feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedConfig {
    /// Socrata resource endpoint (`.json` or `.geojson`), limited with the
    /// `$limit` query parameter.
    Socrata {
        /// Resource URL.
        url: String,
    },
    /// Static `GeoJSON` `FeatureCollection` or JSON array with no paging
    /// parameters.
    GeojsonUrl {
        /// Full URL.
        url: String,
    },
}

impl FeedConfig {
    /// Returns the configured URL.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Socrata { url } | Self::GeojsonUrl { url } => url,
        }
    }

    /// Replaces the configured URL, keeping the fetcher type.
    pub fn set_url(&mut self, new_url: String) {
        match self {
            Self::Socrata { url } | Self::GeojsonUrl { url } => *url = new_url,
        }
    }
}

/// Weather provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WeatherConfig {
    /// Meteostat bulk daily export for a single station.
    Meteostat {
        /// Meteostat station identifier (e.g., `"71877"`).
        station: String,
        /// First date (inclusive) to keep.
        start: NaiveDate,
        /// Last date (inclusive) to keep.
        end: NaiveDate,
        /// Override for the bulk export base URL.
        #[serde(default)]
        base_url: Option<String>,
    },
}
