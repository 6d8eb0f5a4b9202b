//! Staging relations: raw incidents, districts, weather, and the persisted
//! spatial crosswalk.
//!
//! Each load replaces the whole relation inside one transaction. A load
//! with no rows leaves the relation untouched, so a failed or empty pull
//! keeps the previous contents available to the join.

use std::collections::BTreeSet;

use accident_map_incident_models::{District, Incident, JoinedIncident, WeatherDay, latest_by_key};
use duckdb::{Connection, Statement};

use crate::DbError;
use crate::store::{format_date, format_timestamp, parse_date, parse_timestamp};

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 5_000;

/// Replaces `traffic_incidents` with `incidents`, keeping the newest row
/// per identifier.
///
/// Returns the number of rows loaded (0 if `incidents` was empty and the
/// relation was left as is).
///
/// # Errors
///
/// Returns [`DbError`] if the transaction fails; the previous contents are
/// kept in that case.
pub fn replace_incidents(conn: &mut Connection, incidents: &[Incident]) -> Result<usize, DbError> {
    if incidents.is_empty() {
        return Ok(0);
    }

    let deduped = latest_by_key(incidents.to_vec());
    if deduped.len() < incidents.len() {
        log::info!(
            "Deduplicated incident batch: {} -> {} rows ({} duplicates removed)",
            incidents.len(),
            deduped.len(),
            incidents.len() - deduped.len(),
        );
    }

    replace_rows(
        conn,
        "traffic_incidents",
        &["id", "start_dt", "modified_dt", "geometry"],
        &deduped,
        |stmt, idx, incident| {
            stmt.raw_bind_parameter(idx, &incident.id)?;
            stmt.raw_bind_parameter(idx + 1, incident.occurred_at.as_ref().map(format_timestamp))?;
            stmt.raw_bind_parameter(idx + 2, format_timestamp(&incident.modified_at))?;
            stmt.raw_bind_parameter(idx + 3, incident.geometry.as_deref())?;
            Ok(())
        },
    )
}

/// Replaces `community_boundaries` with `districts`. Repeated names keep
/// their first occurrence.
///
/// # Errors
///
/// Returns [`DbError`] if the transaction fails.
pub fn replace_districts(conn: &mut Connection, districts: &[District]) -> Result<usize, DbError> {
    if districts.is_empty() {
        return Ok(0);
    }

    let mut seen = BTreeSet::new();
    let unique: Vec<&District> = districts
        .iter()
        .filter(|d| seen.insert(d.name.as_str()))
        .collect();
    if unique.len() < districts.len() {
        log::warn!(
            "Dropped {} districts with a repeated name",
            districts.len() - unique.len()
        );
    }

    replace_rows(
        conn,
        "community_boundaries",
        &["name", "geometry"],
        &unique,
        |stmt, idx, district| {
            stmt.raw_bind_parameter(idx, &district.name)?;
            stmt.raw_bind_parameter(idx + 1, district.geometry.as_deref())?;
            Ok(())
        },
    )
}

/// Replaces `weather` with `days`. Repeated dates keep their first
/// occurrence.
///
/// # Errors
///
/// Returns [`DbError`] if the transaction fails.
pub fn replace_weather(conn: &mut Connection, days: &[WeatherDay]) -> Result<usize, DbError> {
    if days.is_empty() {
        return Ok(0);
    }

    let mut seen = BTreeSet::new();
    let unique: Vec<&WeatherDay> = days.iter().filter(|d| seen.insert(d.date)).collect();

    replace_rows(
        conn,
        "weather",
        &["date", "min_temp_c", "max_temp_c", "total_precip_mm"],
        &unique,
        |stmt, idx, day| {
            stmt.raw_bind_parameter(idx, format_date(&day.date))?;
            stmt.raw_bind_parameter(idx + 1, day.min_temp_c)?;
            stmt.raw_bind_parameter(idx + 2, day.max_temp_c)?;
            stmt.raw_bind_parameter(idx + 3, day.total_precip_mm)?;
            Ok(())
        },
    )
}

/// Replaces `incident_attribution` with the district and coordinates
/// resolved by the join. Unlike the raw relations an empty join result
/// clears the crosswalk.
///
/// # Errors
///
/// Returns [`DbError`] if the transaction fails.
pub fn replace_attribution(conn: &mut Connection, joined: &[JoinedIncident]) -> Result<usize, DbError> {
    replace_rows(
        conn,
        "incident_attribution",
        &["incident_id", "district_name", "lon", "lat"],
        joined,
        |stmt, idx, row| {
            stmt.raw_bind_parameter(idx, &row.incident_id)?;
            stmt.raw_bind_parameter(idx + 1, row.district_name.as_deref())?;
            stmt.raw_bind_parameter(idx + 2, row.location.map(|c| c.lon))?;
            stmt.raw_bind_parameter(idx + 3, row.location.map(|c| c.lat))?;
            Ok(())
        },
    )
}

/// Deletes every row of `table` and inserts `rows` in multi-row chunks,
/// all in one transaction.
fn replace_rows<T>(
    conn: &mut Connection,
    table: &str,
    columns: &[&str],
    rows: &[T],
    bind: impl Fn(&mut Statement<'_>, usize, &T) -> Result<(), duckdb::Error>,
) -> Result<usize, DbError> {
    let tx = conn.transaction()?;
    tx.execute_batch(&format!("DELETE FROM {table};"))?;

    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let mut total = 0usize;

    for chunk in rows.chunks(CHUNK_SIZE) {
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES {}",
            columns.join(", "),
            vec![placeholders.as_str(); chunk.len()].join(", ")
        );

        let mut stmt = tx.prepare(&sql)?;
        let mut param_idx = 1usize;
        for row in chunk {
            bind(&mut stmt, param_idx, row)?;
            param_idx += columns.len();
        }
        total += stmt.raw_execute()?;
    }

    tx.commit()?;
    log::info!("Loaded {total} rows into {table}");

    Ok(total)
}

/// Reads every staged incident, ordered by identifier.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a timestamp is unreadable.
pub fn read_incidents(conn: &Connection) -> Result<Vec<Incident>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, CAST(start_dt AS VARCHAR), CAST(modified_dt AS VARCHAR), geometry
         FROM traffic_incidents
         ORDER BY id",
    )?;
    let mut rows = stmt.query([])?;
    let mut incidents = Vec::new();

    while let Some(row) = rows.next()? {
        let start: Option<String> = row.get(1)?;
        let modified: String = row.get(2)?;
        incidents.push(Incident {
            id: row.get(0)?,
            occurred_at: start.as_deref().map(parse_timestamp).transpose()?,
            modified_at: parse_timestamp(&modified)?,
            geometry: row.get(3)?,
        });
    }

    Ok(incidents)
}

/// Reads every staged district, ordered by name.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn read_districts(conn: &Connection) -> Result<Vec<District>, DbError> {
    let mut stmt = conn.prepare("SELECT name, geometry FROM community_boundaries ORDER BY name")?;
    let mut rows = stmt.query([])?;
    let mut districts = Vec::new();

    while let Some(row) = rows.next()? {
        districts.push(District {
            name: row.get(0)?,
            geometry: row.get(1)?,
        });
    }

    Ok(districts)
}

/// Reads every staged weather day, ordered by date.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a date is unreadable.
pub fn read_weather(conn: &Connection) -> Result<Vec<WeatherDay>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT CAST(date AS VARCHAR), min_temp_c, max_temp_c, total_precip_mm
         FROM weather
         ORDER BY date",
    )?;
    let mut rows = stmt.query([])?;
    let mut days = Vec::new();

    while let Some(row) = rows.next()? {
        let date: String = row.get(0)?;
        days.push(WeatherDay {
            date: parse_date(&date)?,
            min_temp_c: row.get(1)?,
            max_temp_c: row.get(2)?,
            total_precip_mm: row.get(3)?,
        });
    }

    Ok(days)
}
