//! Secondary indexes and the materialized `accident_geo_view`.
//!
//! `DuckDB` has no materialized views, so `accident_geo_view` is a plain
//! table holding a snapshot of the incident/district/weather join. It is
//! repopulated by [`refresh_materialized_view`] after every fact sync and
//! may lag the staging relations in between. Nothing writes to it except
//! the refresh.

use duckdb::Connection;

use crate::DbError;

/// Secondary indexes, created with `IF NOT EXISTS`.
const INDEXES: &[(&str, &str, &str)] = &[
    ("idx_traffic_incidents_start_dt", "traffic_incidents", "start_dt"),
    ("idx_weather_date", "weather", "date"),
    ("idx_incident_attribution_incident_id", "incident_attribution", "incident_id"),
    ("idx_accident_facts_date", "accident_facts", "occurred_date"),
    ("idx_accident_facts_community", "accident_facts", "community_name"),
    ("idx_accident_facts_precip", "accident_facts", "total_precip_mm"),
];

/// The join the view snapshots: every staged incident, left-joined to its
/// resolved district and its same-day weather.
const VIEW_QUERY: &str = "SELECT
        ti.id AS incident_id,
        ti.start_dt AS occurred_at,
        ti.geometry AS geom,
        a.district_name,
        w.date AS weather_date,
        w.min_temp_c,
        w.max_temp_c,
        w.total_precip_mm,
        a.lon,
        a.lat
    FROM traffic_incidents ti
    LEFT JOIN incident_attribution a ON a.incident_id = ti.id
    LEFT JOIN weather w ON w.date = CAST(ti.start_dt AS DATE)";

/// Creates the secondary indexes. Idempotent.
///
/// # Errors
///
/// Returns [`DbError`] if an index cannot be created.
pub fn ensure_indexes(conn: &Connection) -> Result<(), DbError> {
    for (name, table, column) in INDEXES {
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {name} ON {table} ({column});"
        ))?;
    }
    log::info!("Ensured {} secondary indexes", INDEXES.len());
    Ok(())
}

/// Creates the view table and its index if they do not exist. Idempotent.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn ensure_materialized_view(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accident_geo_view (
            incident_id TEXT,
            occurred_at TIMESTAMP,
            geom TEXT,
            district_name TEXT,
            weather_date DATE,
            min_temp_c DOUBLE,
            max_temp_c DOUBLE,
            total_precip_mm DOUBLE,
            lon DOUBLE,
            lat DOUBLE
        );

        CREATE INDEX IF NOT EXISTS idx_accident_geo_view_district
            ON accident_geo_view (district_name);",
    )?;
    Ok(())
}

/// Replaces the view snapshot with the current join in one transaction.
/// Readers see either the old or the new snapshot.
///
/// Returns the number of rows in the refreshed view.
///
/// # Errors
///
/// Returns [`DbError`] if the transaction fails; the previous snapshot is
/// kept in that case.
pub fn refresh_materialized_view(conn: &mut Connection) -> Result<u64, DbError> {
    ensure_materialized_view(conn)?;

    let tx = conn.transaction()?;
    tx.execute_batch("DELETE FROM accident_geo_view;")?;
    let rows = tx.execute(&format!("INSERT INTO accident_geo_view {VIEW_QUERY}"), [])?;
    tx.commit()?;

    log::info!("Materialized view refreshed with {rows} rows");
    Ok(rows as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{replace_attribution, replace_incidents, replace_weather};
    use crate::store::{count_rows, open_in_memory};
    use accident_map_incident_models::{Coordinates, Incident, JoinedIncident, WeatherDay};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seed(conn: &mut Connection) {
        let incidents = vec![
            Incident {
                id: "A".to_string(),
                occurred_at: Some(ts("2024-03-01 08:15:00")),
                modified_at: ts("2024-03-01 09:00:00"),
                geometry: Some("POINT(-114.05 51.05)".to_string()),
            },
            Incident {
                id: "B".to_string(),
                occurred_at: Some(ts("2024-03-05 23:59:00")),
                modified_at: ts("2024-03-06 09:00:00"),
                geometry: None,
            },
        ];
        replace_incidents(conn, &incidents).unwrap();
        replace_weather(
            conn,
            &[WeatherDay {
                date: date("2024-03-01"),
                min_temp_c: Some(-5.0),
                max_temp_c: Some(2.0),
                total_precip_mm: Some(3.0),
            }],
        )
        .unwrap();
        replace_attribution(
            conn,
            &[JoinedIncident {
                incident_id: "A".to_string(),
                occurred_date: Some(date("2024-03-01")),
                modified_at: ts("2024-03-01 09:00:00"),
                district_name: Some("Downtown".to_string()),
                weather: None,
                location: Some(Coordinates {
                    lon: -114.05,
                    lat: 51.05,
                }),
                geometry: Some("POINT(-114.05 51.05)".to_string()),
            }],
        )
        .unwrap();
    }

    #[test]
    fn ensure_indexes_is_idempotent() {
        let conn = open_in_memory().unwrap();
        ensure_indexes(&conn).unwrap();
        ensure_indexes(&conn).unwrap();

        let count: i64 = conn
            .prepare("SELECT COUNT(*) FROM duckdb_indexes() WHERE index_name LIKE 'idx_%'")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap();
        assert_eq!(count, i64::try_from(INDEXES.len()).unwrap() + 1);
    }

    #[test]
    fn view_is_left_outer_over_incidents() {
        let mut conn = open_in_memory().unwrap();
        seed(&mut conn);

        assert_eq!(refresh_materialized_view(&mut conn).unwrap(), 2);

        let (district, precip, lon): (Option<String>, Option<f64>, Option<f64>) = conn
            .prepare(
                "SELECT district_name, total_precip_mm, lon FROM accident_geo_view
                 WHERE incident_id = 'A'",
            )
            .unwrap()
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap();
        assert_eq!(district.as_deref(), Some("Downtown"));
        assert_eq!(precip, Some(3.0));
        assert_eq!(lon, Some(-114.05));

        let (district, weather_date): (Option<String>, Option<String>) = conn
            .prepare(
                "SELECT district_name, CAST(weather_date AS VARCHAR) FROM accident_geo_view
                 WHERE incident_id = 'B'",
            )
            .unwrap()
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert!(district.is_none());
        assert!(weather_date.is_none());
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let mut conn = open_in_memory().unwrap();
        seed(&mut conn);
        conn.execute_batch(
            "DROP TABLE accident_geo_view;
             CREATE TABLE accident_geo_view (
                incident_id TEXT,
                occurred_at TIMESTAMP,
                geom TEXT,
                district_name TEXT,
                weather_date DATE,
                min_temp_c DOUBLE,
                max_temp_c DOUBLE,
                total_precip_mm DOUBLE,
                lon DOUBLE,
                lat DOUBLE,
                tag TEXT NOT NULL
             );
             INSERT INTO accident_geo_view (incident_id, tag) VALUES ('previous', 'kept');",
        )
        .unwrap();

        // The delete succeeds, then the insert has one column too few.
        assert!(refresh_materialized_view(&mut conn).is_err());

        let ids: Vec<String> = conn
            .prepare("SELECT incident_id FROM accident_geo_view")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec!["previous".to_string()]);
    }

    #[test]
    fn refresh_is_idempotent_and_tracks_staging() {
        let mut conn = open_in_memory().unwrap();
        seed(&mut conn);
        ensure_indexes(&conn).unwrap();

        refresh_materialized_view(&mut conn).unwrap();
        refresh_materialized_view(&mut conn).unwrap();
        assert_eq!(count_rows(&conn, "accident_geo_view").unwrap(), 2);

        replace_incidents(
            &mut conn,
            &[Incident {
                id: "C".to_string(),
                occurred_at: None,
                modified_at: ts("2024-03-07 09:00:00"),
                geometry: None,
            }],
        )
        .unwrap();
        assert_eq!(
            count_rows(&conn, "accident_geo_view").unwrap(),
            2,
            "view is a snapshot until refreshed"
        );
        assert_eq!(refresh_materialized_view(&mut conn).unwrap(), 1);
    }
}
