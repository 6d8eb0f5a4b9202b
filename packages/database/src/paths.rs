#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the `DuckDB` store.
//!
//! The store lives in the project root's `data/` directory unless the
//! `ACCIDENT_MAP_DB` environment variable points elsewhere.

use std::path::{Path, PathBuf};

/// Environment variable overriding the store path.
pub const DB_PATH_ENV: &str = "ACCIDENT_MAP_DB";

/// File name of the default store.
const DB_FILE_NAME: &str = "accident_map.duckdb";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`. Falls back to the
/// current directory if the manifest directory has no grandparent.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the default store path, `data/accident_map.duckdb`.
#[must_use]
pub fn default_db_path() -> PathBuf {
    data_dir().join(DB_FILE_NAME)
}

/// Returns the store path: `ACCIDENT_MAP_DB` if set and non-empty,
/// otherwise [`default_db_path`].
#[must_use]
pub fn db_path() -> PathBuf {
    resolve_db_path(std::env::var(DB_PATH_ENV).ok().as_deref())
}

fn resolve_db_path(override_path: Option<&str>) -> PathBuf {
    match override_path.map(str::trim) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => default_db_path(),
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
