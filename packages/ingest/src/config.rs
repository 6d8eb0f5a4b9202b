//! Run configuration: region selection and environment overrides.

use accident_map_source::registry::{DEFAULT_REGION_ID, all_regions, find_region};
use accident_map_source_models::RegionDefinition;

use crate::IngestError;

/// Overrides the traffic incident endpoint of the selected region.
pub const TRAFFIC_ENDPOINT_ENV: &str = "API_TRAFFIC_ENDPOINT";

/// Overrides the community boundary endpoint of the selected region.
pub const BORDERS_ENDPOINT_ENV: &str = "API_BORDERS_ENDPOINT";

/// Looks up a region (the default one when `id` is `None`), applies the
/// endpoint overrides from the environment, and applies `limit` if given.
///
/// # Errors
///
/// Returns [`IngestError::UnknownRegion`] if no region has that id.
pub fn resolve_region(id: Option<&str>, limit: Option<u64>) -> Result<RegionDefinition, IngestError> {
    let id = id.unwrap_or(DEFAULT_REGION_ID);
    let mut region = find_region(id).ok_or_else(|| IngestError::UnknownRegion {
        message: format!(
            "{id} (available: {})",
            all_regions()
                .iter()
                .map(|r| r.id().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    })?;

    apply_overrides(
        &mut region,
        std::env::var(TRAFFIC_ENDPOINT_ENV).ok(),
        std::env::var(BORDERS_ENDPOINT_ENV).ok(),
    );
    if let Some(limit) = limit {
        region.fetch_limit = limit;
    }

    Ok(region)
}

/// Replaces the feed URLs with any non-blank override.
pub fn apply_overrides(
    region: &mut RegionDefinition,
    traffic_url: Option<String>,
    borders_url: Option<String>,
) {
    if let Some(url) = traffic_url.filter(|u| !u.trim().is_empty()) {
        log::info!("Using traffic endpoint override {url}");
        region.traffic.set_url(url);
    }
    if let Some(url) = borders_url.filter(|u| !u.trim().is_empty()) {
        log::info!("Using boundaries endpoint override {url}");
        region.boundaries.set_url(url);
    }
}
