#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Upstream feeds for the accident map.
//!
//! Fetches traffic incidents and community boundaries from Socrata-style
//! JSON/`GeoJSON` endpoints and daily weather from the Meteostat bulk
//! export, flattens heterogeneous records into attribute maps, and
//! extracts typed rows from them.

pub mod flatten;
pub mod meteostat;
pub mod parsing;
pub mod records;
pub mod registry;
pub mod retry;
pub mod socrata;

use std::time::Duration;

/// Per-request timeout for every upstream call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur while fetching or decoding upstream data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (decompression, file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Region definition could not be parsed.
    #[error("Region definition error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The response was readable but not in the expected shape.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

/// Builds the shared HTTP client used for every feed.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the TLS backend cannot be initialized.
pub fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("accident-map/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}
