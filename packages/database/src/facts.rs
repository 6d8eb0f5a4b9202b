//! Fact table synchronizer.
//!
//! `accident_facts` is keyed by incident identifier and only ever grows or
//! moves forward in time: a batch row is inserted when its identifier is
//! new, applied over the stored fact when its last-modified timestamp is
//! strictly newer, and discarded otherwise. No row is ever deleted.
//!
//! A batch is applied in one transaction: the rows are staged in a
//! temporary table, then one guarded `UPDATE ... FROM` and one
//! `INSERT ... WHERE NOT EXISTS` apply them. The recency predicate lives in
//! the SQL, so a stale row can never overwrite a newer fact.

use std::collections::BTreeMap;

use accident_map_incident_models::{Fact, FactTransition, JoinedIncident, latest_by_key};
use chrono::NaiveDateTime;
use duckdb::Connection;

use crate::DbError;
use crate::store::{format_date, format_timestamp, parse_optional_date, parse_timestamp};

/// Number of rows per INSERT chunk into the batch table.
const CHUNK_SIZE: usize = 2_000;

const FACT_COLUMNS: &str = "incident_id, occurred_date, modified_dt, community_name, \
     weather_date, min_temp_c, max_temp_c, total_precip_mm, accident_lon, accident_lat, \
     accident_geom";

const FACT_COLUMN_COUNT: usize = 11;

/// Result of one [`sync`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Distinct incident identifiers in the batch.
    pub received: usize,
    /// Facts created.
    pub inserted: usize,
    /// Facts overwritten by a strictly newer row.
    pub updated: usize,
    /// Rows discarded because the stored fact was as new or newer.
    pub unchanged: usize,
}

impl SyncOutcome {
    /// Number of facts written (inserted plus updated).
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Upserts a batch of joined incidents into `accident_facts`.
///
/// Rows sharing an identifier are collapsed to the newest one first.
/// Running the same batch twice leaves the table as after the first run.
/// An empty batch is a no-op.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the transaction is rolled
/// back and the table is left as it was.
pub fn sync(conn: &mut Connection, batch: &[JoinedIncident]) -> Result<SyncOutcome, DbError> {
    if batch.is_empty() {
        log::info!("Fact sync: empty batch, nothing to do");
        return Ok(SyncOutcome::default());
    }

    let facts: Vec<Fact> = latest_by_key(batch.to_vec()).iter().map(Fact::from).collect();
    if facts.len() < batch.len() {
        log::info!(
            "Collapsed fact batch: {} -> {} rows ({} superseded within the batch)",
            batch.len(),
            facts.len(),
            batch.len() - facts.len(),
        );
    }

    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE OR REPLACE TEMPORARY TABLE fact_batch AS
         SELECT * FROM accident_facts LIMIT 0;",
    )?;
    stage_batch(&tx, &facts)?;

    let stored = stored_versions(&tx)?;
    let mut outcome = SyncOutcome {
        received: facts.len(),
        ..SyncOutcome::default()
    };
    for fact in &facts {
        match FactTransition::classify(stored.get(&fact.incident_id).copied(), fact.modified_at) {
            FactTransition::Insert => outcome.inserted += 1,
            FactTransition::Update => outcome.updated += 1,
            FactTransition::Discard => outcome.unchanged += 1,
        }
    }

    let updated = tx.execute(
        "UPDATE accident_facts SET
            occurred_date = b.occurred_date,
            modified_dt = b.modified_dt,
            community_name = b.community_name,
            weather_date = b.weather_date,
            min_temp_c = b.min_temp_c,
            max_temp_c = b.max_temp_c,
            total_precip_mm = b.total_precip_mm,
            accident_lon = b.accident_lon,
            accident_lat = b.accident_lat,
            accident_geom = b.accident_geom
         FROM fact_batch AS b
         WHERE accident_facts.incident_id = b.incident_id
           AND accident_facts.modified_dt < b.modified_dt",
        [],
    )?;

    let inserted = tx.execute(
        &format!(
            "INSERT INTO accident_facts ({FACT_COLUMNS})
             SELECT {FACT_COLUMNS} FROM fact_batch AS b
             WHERE NOT EXISTS (
                 SELECT 1 FROM accident_facts AS f WHERE f.incident_id = b.incident_id
             )"
        ),
        [],
    )?;

    if updated != outcome.updated || inserted != outcome.inserted {
        log::warn!(
            "Fact sync applied {inserted} inserts and {updated} updates, classified {} and {}",
            outcome.inserted,
            outcome.updated
        );
        outcome.inserted = inserted;
        outcome.updated = updated;
        outcome.unchanged = outcome.received.saturating_sub(inserted + updated);
    }

    tx.execute_batch("DROP TABLE fact_batch;")?;
    tx.commit()?;

    log::info!(
        "Fact sync: {} received, {} inserted, {} updated, {} unchanged",
        outcome.received,
        outcome.inserted,
        outcome.updated,
        outcome.unchanged,
    );

    Ok(outcome)
}

fn stage_batch(conn: &Connection, facts: &[Fact]) -> Result<(), DbError> {
    let placeholders = format!("({})", vec!["?"; FACT_COLUMN_COUNT].join(", "));

    for chunk in facts.chunks(CHUNK_SIZE) {
        let sql = format!(
            "INSERT INTO fact_batch ({FACT_COLUMNS}) VALUES {}",
            vec![placeholders.as_str(); chunk.len()].join(", ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut idx = 1usize;

        for fact in chunk {
            stmt.raw_bind_parameter(idx, &fact.incident_id)?;
            stmt.raw_bind_parameter(idx + 1, fact.occurred_date.as_ref().map(format_date))?;
            stmt.raw_bind_parameter(idx + 2, format_timestamp(&fact.modified_at))?;
            stmt.raw_bind_parameter(idx + 3, fact.community_name.as_deref())?;
            stmt.raw_bind_parameter(idx + 4, fact.weather_date.as_ref().map(format_date))?;
            stmt.raw_bind_parameter(idx + 5, fact.min_temp_c)?;
            stmt.raw_bind_parameter(idx + 6, fact.max_temp_c)?;
            stmt.raw_bind_parameter(idx + 7, fact.total_precip_mm)?;
            stmt.raw_bind_parameter(idx + 8, fact.accident_lon)?;
            stmt.raw_bind_parameter(idx + 9, fact.accident_lat)?;
            stmt.raw_bind_parameter(idx + 10, fact.accident_geom.as_deref())?;
            idx += FACT_COLUMN_COUNT;
        }

        stmt.raw_execute()?;
    }

    Ok(())
}

/// Stored last-modified timestamps for the identifiers in `fact_batch`.
fn stored_versions(conn: &Connection) -> Result<BTreeMap<String, NaiveDateTime>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT f.incident_id, CAST(f.modified_dt AS VARCHAR)
         FROM accident_facts AS f
         JOIN fact_batch AS b ON b.incident_id = f.incident_id",
    )?;
    let mut rows = stmt.query([])?;
    let mut versions = BTreeMap::new();

    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let modified: String = row.get(1)?;
        versions.insert(id, parse_timestamp(&modified)?);
    }

    Ok(versions)
}

/// Column list for reading facts, with temporal columns cast to text.
pub(crate) const FACT_SELECT: &str = "incident_id, CAST(occurred_date AS VARCHAR), \
     CAST(modified_dt AS VARCHAR), community_name, CAST(weather_date AS VARCHAR), \
     min_temp_c, max_temp_c, total_precip_mm, accident_lon, accident_lat, accident_geom";

/// Decodes a row selected with [`FACT_SELECT`].
pub(crate) fn fact_from_row(row: &duckdb::Row<'_>) -> Result<Fact, DbError> {
    let occurred: Option<String> = row.get(1)?;
    let modified: String = row.get(2)?;
    let weather_date: Option<String> = row.get(4)?;

    Ok(Fact {
        incident_id: row.get(0)?,
        occurred_date: parse_optional_date(occurred.as_deref())?,
        modified_at: parse_timestamp(&modified)?,
        community_name: row.get(3)?,
        weather_date: parse_optional_date(weather_date.as_deref())?,
        min_temp_c: row.get(5)?,
        max_temp_c: row.get(6)?,
        total_precip_mm: row.get(7)?,
        accident_lon: row.get(8)?,
        accident_lat: row.get(9)?,
        accident_geom: row.get(10)?,
    })
}

/// Reads a single fact by identifier.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored value is unreadable.
pub fn get(conn: &Connection, incident_id: &str) -> Result<Option<Fact>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FACT_SELECT} FROM accident_facts WHERE incident_id = ?"
    ))?;
    let mut rows = stmt.query([incident_id])?;

    match rows.next()? {
        Some(row) => Ok(Some(fact_from_row(row)?)),
        None => Ok(None),
    }
}

/// Reads every fact, ordered by identifier.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored value is unreadable.
pub fn load_all(conn: &Connection) -> Result<Vec<Fact>, DbError> {
    crate::queries::facts_filtered(conn, &crate::queries::FactFilter::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{count_rows, open_in_memory};
    use accident_map_incident_models::{Coordinates, WeatherDay};
    use chrono::NaiveDate;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(id: &str, modified: &str, district: Option<&str>) -> JoinedIncident {
        JoinedIncident {
            incident_id: id.to_string(),
            occurred_date: Some(date("2024-03-01")),
            modified_at: ts(modified),
            district_name: district.map(str::to_string),
            weather: Some(WeatherDay {
                date: date("2024-03-01"),
                min_temp_c: Some(-5.0),
                max_temp_c: Some(2.0),
                total_precip_mm: Some(3.0),
            }),
            location: Some(Coordinates {
                lon: -114.05,
                lat: 51.05,
            }),
            geometry: Some("POINT(-114.05 51.05)".to_string()),
        }
    }

    #[test]
    fn inserts_new_facts() {
        let mut conn = open_in_memory().unwrap();
        let outcome = sync(
            &mut conn,
            &[
                row("A", "2024-03-01 09:00:00", Some("Downtown")),
                row("B", "2024-03-01 09:00:00", None),
            ],
        )
        .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.applied(), 2);

        let fact = get(&conn, "A").unwrap().unwrap();
        assert_eq!(fact, Fact::from(&row("A", "2024-03-01 09:00:00", Some("Downtown"))));
        assert!(get(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn sync_is_idempotent() {
        let mut conn = open_in_memory().unwrap();
        let batch = vec![
            row("A", "2024-03-01 09:00:00", Some("Downtown")),
            row("B", "2024-03-01 10:30:00.250000", None),
        ];

        sync(&mut conn, &batch).unwrap();
        let once = load_all(&conn).unwrap();

        let outcome = sync(&mut conn, &batch).unwrap();
        assert_eq!(outcome.applied(), 0, "second run must not write");
        assert_eq!(outcome.unchanged, 2);
        assert_eq!(load_all(&conn).unwrap(), once);
    }

    #[test]
    fn only_strictly_newer_rows_update() {
        let mut conn = open_in_memory().unwrap();
        sync(&mut conn, &[row("A", "2024-03-01 09:00:00", Some("Downtown"))]).unwrap();

        let same = sync(&mut conn, &[row("A", "2024-03-01 09:00:00", Some("Beltline"))]).unwrap();
        assert_eq!(same.unchanged, 1);
        let older = sync(&mut conn, &[row("A", "2024-03-01 08:00:00", Some("Beltline"))]).unwrap();
        assert_eq!(older.unchanged, 1);
        assert_eq!(
            get(&conn, "A").unwrap().unwrap().community_name.as_deref(),
            Some("Downtown")
        );

        let newer = sync(&mut conn, &[row("A", "2024-03-01 11:00:00", None)]).unwrap();
        assert_eq!(newer.updated, 1);
        let fact = get(&conn, "A").unwrap().unwrap();
        assert_eq!(fact.community_name, None);
        assert_eq!(fact.modified_at, ts("2024-03-01 11:00:00"));
    }

    #[test]
    fn stored_timestamp_is_maximum_ever_submitted() {
        let mut conn = open_in_memory().unwrap();
        for modified in [
            "2024-03-01 10:00:00",
            "2024-03-01 12:00:00",
            "2024-03-01 11:00:00",
            "2024-03-01 09:00:00",
        ] {
            sync(&mut conn, &[row("A", modified, None)]).unwrap();
        }
        assert_eq!(
            get(&conn, "A").unwrap().unwrap().modified_at,
            ts("2024-03-01 12:00:00")
        );
    }

    #[test]
    fn duplicate_ids_in_batch_collapse_to_newest() {
        let mut conn = open_in_memory().unwrap();
        let outcome = sync(
            &mut conn,
            &[
                row("A", "2024-03-01 09:00:00", Some("Downtown")),
                row("A", "2024-03-01 12:00:00", Some("Beltline")),
                row("A", "2024-03-01 10:00:00", Some("Chinatown")),
            ],
        )
        .unwrap();

        assert_eq!(outcome.received, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(
            get(&conn, "A").unwrap().unwrap().community_name.as_deref(),
            Some("Beltline")
        );
    }

    #[test]
    fn facts_absent_from_batch_are_kept() {
        let mut conn = open_in_memory().unwrap();
        sync(&mut conn, &[row("A", "2024-03-01 09:00:00", None)]).unwrap();
        sync(&mut conn, &[row("B", "2024-03-01 09:00:00", None)]).unwrap();
        assert_eq!(count_rows(&conn, "accident_facts").unwrap(), 2);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut conn = open_in_memory().unwrap();
        sync(&mut conn, &[row("A", "2024-03-01 09:00:00", None)]).unwrap();
        let before = load_all(&conn).unwrap();

        let outcome = sync(&mut conn, &[]).unwrap();
        assert_eq!(outcome, SyncOutcome::default());
        assert_eq!(load_all(&conn).unwrap(), before);
    }

    #[test]
    fn failed_statement_rolls_back_the_whole_batch() {
        let mut conn = open_in_memory().unwrap();
        conn.execute_batch(
            "DROP TABLE accident_facts;
             CREATE TABLE accident_facts (
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
                accident_geom TEXT,
                CHECK (community_name IS NULL OR community_name <> 'Rejected')
             );",
        )
        .unwrap();

        sync(&mut conn, &[row("A", "2024-03-01 09:00:00", Some("Downtown"))]).unwrap();
        let before = load_all(&conn).unwrap();

        // The update of A runs before the insert of B violates the check.
        let result = sync(
            &mut conn,
            &[
                row("A", "2024-03-02 09:00:00", Some("Beltline")),
                row("B", "2024-03-02 09:00:00", Some("Rejected")),
            ],
        );
        assert!(result.is_err());
        assert_eq!(load_all(&conn).unwrap(), before, "no part of the batch is applied");

        let outcome = sync(&mut conn, &[row("A", "2024-03-02 09:00:00", Some("Beltline"))]).unwrap();
        assert_eq!(outcome.updated, 1, "store stays usable after a rollback");
        assert_eq!(
            get(&conn, "A").unwrap().unwrap().community_name.as_deref(),
            Some("Beltline")
        );
    }

    #[test]
    fn mixed_batch_counts_each_transition() {
        let mut conn = open_in_memory().unwrap();
        sync(
            &mut conn,
            &[
                row("stale", "2024-03-01 09:00:00", None),
                row("current", "2024-03-01 09:00:00", None),
            ],
        )
        .unwrap();

        let outcome = sync(
            &mut conn,
            &[
                row("new", "2024-03-01 09:00:00", None),
                row("stale", "2024-03-02 09:00:00", None),
                row("current", "2024-03-01 09:00:00", None),
            ],
        )
        .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome {
                received: 3,
                inserted: 1,
                updated: 1,
                unchanged: 1,
            }
        );
    }
}
