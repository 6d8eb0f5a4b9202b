//! Region registry: loads region definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`].

use accident_map_source_models::RegionDefinition;

use crate::SourceError;

/// Region used when none is requested.
pub const DEFAULT_REGION_ID: &str = "calgary";

/// TOML configs embedded at compile time.
const REGION_TOMLS: &[(&str, &str)] = &[("calgary", include_str!("../sources/calgary.toml"))];

/// Parses a region definition from TOML text.
///
/// # Errors
///
/// Returns [`SourceError::Toml`] if the text is not a valid definition.
pub fn parse_region_toml(text: &str) -> Result<RegionDefinition, SourceError> {
    Ok(toml::from_str(text)?)
}

/// Returns all configured region definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (the configs are embedded, so
/// this is caught by the tests below).
#[must_use]
pub fn all_regions() -> Vec<RegionDefinition> {
    REGION_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_region_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a region by identifier.
#[must_use]
pub fn find_region(id: &str) -> Option<RegionDefinition> {
    all_regions().into_iter().find(|r| r.id == id)
}
