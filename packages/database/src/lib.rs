#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` store for the accident map.
//!
//! A single `DuckDB` file holds the raw staging relations
//! (`traffic_incidents`, `community_boundaries`, `weather`), the persisted
//! spatial crosswalk (`incident_attribution`), the derived `accident_facts`
//! table, the materialized `accident_geo_view`, and a `_meta` table for run
//! bookkeeping. Geometry is stored as WKT text; containment is resolved in
//! memory by the spatial crate.
//!
//! The connection is always an explicit parameter. Writes that must be
//! observed atomically run inside a transaction.

pub mod facts;
pub mod paths;
pub mod queries;
pub mod staging;
pub mod store;
pub mod views;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
