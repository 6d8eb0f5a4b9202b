//! Read-only analytics queries for dashboards and reports.
//!
//! Nothing here writes to the store.

use accident_map_incident_models::Fact;
use chrono::NaiveDate;
use duckdb::Connection;

use crate::DbError;
use crate::facts::{FACT_SELECT, fact_from_row};
use crate::store::{format_date, parse_date};

/// Number of accidents attributed to a district.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistrictCount {
    /// District name.
    pub district_name: String,
    /// Incidents in the view resolved to this district.
    pub accident_count: u64,
}

/// Accident count and weather for one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyWeather {
    /// Weather observation date.
    pub date: NaiveDate,
    /// Facts that occurred on this date.
    pub accident_count: u64,
    /// Minimum temperature in degrees Celsius.
    pub min_temp_c: Option<f64>,
    /// Maximum temperature in degrees Celsius.
    pub max_temp_c: Option<f64>,
    /// Total precipitation in millimetres.
    pub total_precip_mm: Option<f64>,
}

/// Filter for [`facts_filtered`]. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactFilter {
    /// Earliest occurrence date (inclusive).
    pub from: Option<NaiveDate>,
    /// Latest occurrence date (inclusive).
    pub to: Option<NaiveDate>,
    /// Resolved district name.
    pub district: Option<String>,
    /// Minimum total precipitation in millimetres.
    pub min_precip_mm: Option<f64>,
}

/// Accidents per district from the materialized view, including districts
/// with no accidents. Ordered by count descending, then name.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn accidents_per_district(conn: &Connection) -> Result<Vec<DistrictCount>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT cb.name, COUNT(v.incident_id) AS accident_count
         FROM (SELECT DISTINCT name FROM community_boundaries) cb
         LEFT JOIN accident_geo_view v ON v.district_name = cb.name
         GROUP BY cb.name
         ORDER BY accident_count DESC, cb.name",
    )?;
    let mut rows = stmt.query([])?;
    let mut counts = Vec::new();

    while let Some(row) = rows.next()? {
        let count: i64 = row.get(1)?;
        counts.push(DistrictCount {
            district_name: row.get(0)?,
            #[allow(clippy::cast_sign_loss)]
            accident_count: count as u64,
        });
    }

    Ok(counts)
}

/// Accidents per weather day: every weather date, left-joined to the facts
/// that occurred on it. Ordered by date.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a date is unreadable.
pub fn daily_weather_accidents(conn: &Connection) -> Result<Vec<DailyWeather>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT CAST(w.date AS VARCHAR), COUNT(f.incident_id),
                w.min_temp_c, w.max_temp_c, w.total_precip_mm
         FROM weather w
         LEFT JOIN accident_facts f ON f.occurred_date = w.date
         GROUP BY w.date, w.min_temp_c, w.max_temp_c, w.total_precip_mm
         ORDER BY w.date",
    )?;
    let mut rows = stmt.query([])?;
    let mut days = Vec::new();

    while let Some(row) = rows.next()? {
        let date: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        days.push(DailyWeather {
            date: parse_date(&date)?,
            #[allow(clippy::cast_sign_loss)]
            accident_count: count as u64,
            min_temp_c: row.get(2)?,
            max_temp_c: row.get(3)?,
            total_precip_mm: row.get(4)?,
        });
    }

    Ok(days)
}

/// Facts matching `filter`, ordered by identifier.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored value is unreadable.
pub fn facts_filtered(conn: &Connection, filter: &FactFilter) -> Result<Vec<Fact>, DbError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn duckdb::ToSql>> = Vec::new();

    if let Some(from) = &filter.from {
        clauses.push("occurred_date >= CAST(? AS DATE)");
        params.push(Box::new(format_date(from)));
    }
    if let Some(to) = &filter.to {
        clauses.push("occurred_date <= CAST(? AS DATE)");
        params.push(Box::new(format_date(to)));
    }
    if let Some(district) = &filter.district {
        clauses.push("community_name = ?");
        params.push(Box::new(district.clone()));
    }
    if let Some(min_precip) = filter.min_precip_mm {
        clauses.push("total_precip_mm >= ?");
        params.push(Box::new(min_precip));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {FACT_SELECT} FROM accident_facts {where_clause} ORDER BY incident_id"
    ))?;
    let mut rows = stmt.query(duckdb::params_from_iter(params.iter().map(|p| &**p)))?;
    let mut facts = Vec::new();
    while let Some(row) = rows.next()? {
        facts.push(fact_from_row(row)?);
    }

    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::sync;
    use crate::staging::{replace_attribution, replace_districts, replace_incidents, replace_weather};
    use crate::store::open_in_memory;
    use crate::views::refresh_materialized_view;
    use accident_map_incident_models::{Coordinates, District, Incident, JoinedIncident, WeatherDay};
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn weather(d: &str, precip: f64) -> WeatherDay {
        WeatherDay {
            date: date(d),
            min_temp_c: Some(-5.0),
            max_temp_c: Some(2.0),
            total_precip_mm: Some(precip),
        }
    }

    fn joined(id: &str, d: &str, district: Option<&str>, precip: f64) -> JoinedIncident {
        JoinedIncident {
            incident_id: id.to_string(),
            occurred_date: Some(date(d)),
            modified_at: ts("2024-03-10 00:00:00"),
            district_name: district.map(str::to_string),
            weather: Some(weather(d, precip)),
            location: Some(Coordinates {
                lon: -114.05,
                lat: 51.05,
            }),
            geometry: Some("POINT(-114.05 51.05)".to_string()),
        }
    }

    fn seeded() -> Connection {
        let mut conn = open_in_memory().unwrap();
        let rows = vec![
            joined("A", "2024-03-01", Some("Downtown"), 3.0),
            joined("B", "2024-03-01", Some("Downtown"), 3.0),
            joined("C", "2024-03-02", Some("Beltline"), 0.0),
            joined("D", "2024-03-02", None, 0.0),
        ];

        let incidents: Vec<Incident> = rows
            .iter()
            .map(|r| Incident {
                id: r.incident_id.clone(),
                occurred_at: r.occurred_date.and_then(|d| d.and_hms_opt(12, 0, 0)),
                modified_at: r.modified_at,
                geometry: r.geometry.clone(),
            })
            .collect();

        replace_incidents(&mut conn, &incidents).unwrap();
        replace_districts(
            &mut conn,
            &["Downtown", "Beltline", "Chinatown"].map(|name| District {
                name: name.to_string(),
                geometry: None,
            }),
        )
        .unwrap();
        replace_weather(
            &mut conn,
            &[weather("2024-03-01", 3.0), weather("2024-03-02", 0.0), weather("2024-03-03", 1.0)],
        )
        .unwrap();
        replace_attribution(&mut conn, &rows).unwrap();
        sync(&mut conn, &rows).unwrap();
        refresh_materialized_view(&mut conn).unwrap();
        conn
    }

    #[test]
    fn counts_accidents_per_district_including_empty_ones() {
        let conn = seeded();
        let counts = accidents_per_district(&conn).unwrap();
        let pairs: Vec<(&str, u64)> = counts
            .iter()
            .map(|c| (c.district_name.as_str(), c.accident_count))
            .collect();
        assert_eq!(pairs, vec![("Downtown", 2), ("Beltline", 1), ("Chinatown", 0)]);
    }

    #[test]
    fn daily_counts_cover_every_weather_day() {
        let conn = seeded();
        let days = daily_weather_accidents(&conn).unwrap();
        let counts: Vec<u64> = days.iter().map(|d| d.accident_count).collect();
        assert_eq!(counts, vec![2, 2, 0]);
        assert_eq!(days[2].date, date("2024-03-03"));
        assert_eq!(days[0].total_precip_mm, Some(3.0));
    }

    #[test]
    fn filters_facts() {
        let conn = seeded();
        let ids = |filter: &FactFilter| -> Vec<String> {
            facts_filtered(&conn, filter)
                .unwrap()
                .into_iter()
                .map(|f| f.incident_id)
                .collect()
        };

        assert_eq!(ids(&FactFilter::default()).len(), 4);
        assert_eq!(
            ids(&FactFilter {
                from: Some(date("2024-03-02")),
                ..FactFilter::default()
            }),
            vec!["C", "D"]
        );
        assert_eq!(
            ids(&FactFilter {
                district: Some("Downtown".to_string()),
                to: Some(date("2024-03-01")),
                ..FactFilter::default()
            }),
            vec!["A", "B"]
        );
        assert_eq!(
            ids(&FactFilter {
                min_precip_mm: Some(1.0),
                ..FactFilter::default()
            }),
            vec!["A", "B"]
        );
        assert!(
            ids(&FactFilter {
                district: Some("Nowhere".to_string()),
                ..FactFilter::default()
            })
            .is_empty()
        );
    }
}
