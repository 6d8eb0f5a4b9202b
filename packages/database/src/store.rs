//! Store lifecycle: opening, schema creation, and run metadata.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use duckdb::Connection;

use crate::DbError;

/// Format used to bind timestamps as text. `DuckDB` casts it to
/// `TIMESTAMP` on insert.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format used to bind dates as text.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Relations whose row counts are recorded in `_meta` after a refresh.
pub const RELATIONS: &[&str] = &[
    "traffic_incidents",
    "community_boundaries",
    "weather",
    "incident_attribution",
    "accident_facts",
    "accident_geo_view",
];

/// Opens (or creates) the store at `path` and ensures the schema exists.
///
/// `DuckDB` holds an exclusive file lock for the lifetime of the
/// connection, so concurrent refresh runs against the same file are
/// serialized by the second one failing to open.
///
/// # Errors
///
/// Returns [`DbError`] if the directory, connection, or schema creation
/// fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute_batch(
        "SET threads = 4;
         SET memory_limit = '512MB';",
    )?;

    create_schema(&conn)?;

    Ok(conn)
}

/// Opens a fresh in-memory store with the schema applied.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Creates every table if it does not exist yet. Idempotent.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS traffic_incidents (
            id TEXT NOT NULL,
            start_dt TIMESTAMP,
            modified_dt TIMESTAMP NOT NULL,
            geometry TEXT
        );

        CREATE TABLE IF NOT EXISTS community_boundaries (
            name TEXT NOT NULL,
            geometry TEXT
        );

        CREATE TABLE IF NOT EXISTS weather (
            date DATE NOT NULL,
            min_temp_c DOUBLE,
            max_temp_c DOUBLE,
            total_precip_mm DOUBLE
        );

        CREATE TABLE IF NOT EXISTS incident_attribution (
            incident_id TEXT NOT NULL,
            district_name TEXT,
            lon DOUBLE,
            lat DOUBLE
        );

        CREATE TABLE IF NOT EXISTS accident_facts (
            incident_id TEXT NOT NULL PRIMARY KEY,
            occurred_date DATE,
            modified_dt TIMESTAMP NOT NULL,
            community_name TEXT,
            weather_date DATE,
            min_temp_c DOUBLE,
            max_temp_c DOUBLE,
            total_precip_mm DOUBLE,
            accident_lon DOUBLE,
            accident_lat DOUBLE,
            accident_geom TEXT
        );

        CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    crate::views::ensure_materialized_view(conn)?;

    Ok(())
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    let result = stmt.query_row([key], |row| row.get(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

/// Returns the number of rows in `relation`.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] for a relation outside [`RELATIONS`],
/// or [`DbError::DuckDb`] if the query fails.
pub fn count_rows(conn: &Connection, relation: &str) -> Result<u64, DbError> {
    if !RELATIONS.contains(&relation) {
        return Err(DbError::Conversion {
            message: format!("Unknown relation: {relation}"),
        });
    }

    let count: i64 = conn
        .prepare(&format!("SELECT COUNT(*) FROM {relation}"))?
        .query_row([], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

/// Records the refresh time and per-relation row counts in `_meta`.
///
/// # Errors
///
/// Returns [`DbError`] if a count or metadata write fails.
pub fn record_refresh(conn: &Connection) -> Result<(), DbError> {
    for relation in RELATIONS {
        let count = count_rows(conn, relation)?;
        set_meta(conn, &format!("{relation}_count"), &count.to_string())?;
    }

    let now = chrono::Utc::now().to_rfc3339();
    set_meta(conn, "last_refreshed_at", &now)?;

    Ok(())
}

/// Formats a timestamp for binding.
pub(crate) fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Formats a date for binding.
pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a `DuckDB` timestamp text representation.
///
/// `DuckDB`'s `VARCHAR` cast omits the fractional part when it is zero:
/// - `2024-01-15 10:30:00`
/// - `2024-01-15 10:30:00.123`
pub(crate) fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DbError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| DbError::Conversion {
            message: format!("Invalid timestamp {s:?}: {e}"),
        })
}

/// Parses a `DuckDB` date text representation.
pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| DbError::Conversion {
        message: format!("Invalid date {s:?}: {e}"),
    })
}

/// Parses an optional `DuckDB` date text representation.
pub(crate) fn parse_optional_date(s: Option<&str>) -> Result<Option<NaiveDate>, DbError> {
    s.map(parse_date).transpose()
}
