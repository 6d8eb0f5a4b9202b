//! Spatial/temporal enrichment of incidents.
//!
//! Every incident is resolved against the district index (point in
//! polygon) and the weather calendar (occurrence date equals observation
//! date). Both lookups are left-outer: the output always has exactly one
//! row per input incident, in input order.

use std::collections::BTreeMap;

use accident_map_incident_models::{Coordinates, Incident, JoinedIncident, WeatherDay};
use chrono::NaiveDate;

use crate::DistrictIndex;
use crate::normalize::parse_point;

/// Weather observations keyed by calendar date.
#[derive(Debug, Default)]
pub struct WeatherCalendar {
    days: BTreeMap<NaiveDate, WeatherDay>,
}

impl WeatherCalendar {
    /// Builds the calendar. A single source is expected to report one row
    /// per date; if a date repeats, the first row is kept.
    #[must_use]
    pub fn new(days: &[WeatherDay]) -> Self {
        let mut map = BTreeMap::new();
        let mut duplicates = 0usize;

        for day in days {
            if map.contains_key(&day.date) {
                duplicates += 1;
            } else {
                map.insert(day.date, *day);
            }
        }

        if duplicates > 0 {
            log::warn!("Ignored {duplicates} duplicate weather rows (one row per date expected)");
        }

        Self { days: map }
    }

    /// Weather observed on `date`, if any.
    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<&WeatherDay> {
        self.days.get(&date)
    }

    /// Number of distinct dates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Whether the calendar has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Resolves district and weather for every incident.
#[must_use]
pub fn join_incidents(
    incidents: &[Incident],
    districts: &DistrictIndex,
    weather: &WeatherCalendar,
) -> Vec<JoinedIncident> {
    let mut unlocated = 0usize;
    let mut outside = 0usize;
    let mut no_weather = 0usize;

    let joined: Vec<JoinedIncident> = incidents
        .iter()
        .map(|incident| {
            let location = locate(incident);
            let district_name = location.and_then(|c| districts.lookup(c.lon, c.lat));
            let occurred_date = incident.occurred_date();
            let weather_day = occurred_date.and_then(|d| weather.get(d)).copied();

            match (location, district_name) {
                (None, _) => unlocated += 1,
                (Some(_), None) => outside += 1,
                (Some(_), Some(_)) => {}
            }
            if weather_day.is_none() {
                no_weather += 1;
            }

            JoinedIncident {
                incident_id: incident.id.clone(),
                occurred_date,
                modified_at: incident.modified_at,
                district_name: district_name.map(str::to_string),
                weather: weather_day,
                location,
                geometry: incident.geometry.clone(),
            }
        })
        .collect();

    log::info!(
        "Joined {} incidents ({unlocated} unlocated, {outside} outside all districts, \
         {no_weather} without weather)",
        joined.len()
    );

    joined
}

fn locate(incident: &Incident) -> Option<Coordinates> {
    let wkt = incident.geometry.as_deref()?;
    match parse_point(wkt) {
        Ok(point) => Some(Coordinates {
            lon: point.x(),
            lat: point.y(),
        }),
        Err(e) => {
            log::debug!("Incident {} has unusable geometry: {e}", incident.id);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accident_map_incident_models::District;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn incident(id: &str, occurred: &str, geometry: Option<&str>) -> Incident {
        Incident {
            id: id.to_string(),
            occurred_at: Some(ts(occurred)),
            modified_at: ts("2024-03-02 00:00:00"),
            geometry: geometry.map(str::to_string),
        }
    }

    fn fixtures() -> (DistrictIndex, WeatherCalendar) {
        let districts = DistrictIndex::from_districts(&[
            District {
                name: "Downtown".to_string(),
                geometry: Some(
                    "MULTIPOLYGON(((-114.1 51.0, -114.0 51.0, -114.0 51.1, -114.1 51.1, -114.1 51.0)))"
                        .to_string(),
                ),
            },
            District {
                name: "Beltline".to_string(),
                geometry: Some(
                    "MULTIPOLYGON(((-114.08 51.03, -114.02 51.03, -114.02 51.045, -114.08 51.045, -114.08 51.03)))"
                        .to_string(),
                ),
            },
        ]);
        let weather = WeatherCalendar::new(&[WeatherDay {
            date: date("2024-03-01"),
            min_temp_c: Some(-5.0),
            max_temp_c: Some(2.0),
            total_precip_mm: Some(3.0),
        }]);
        (districts, weather)
    }

    #[test]
    fn resolves_district_and_weather() {
        let (districts, weather) = fixtures();
        let joined = join_incidents(
            &[incident("A", "2024-03-01 08:15:00", Some("POINT(-114.05 51.05)"))],
            &districts,
            &weather,
        );

        assert_eq!(joined.len(), 1);
        let row = &joined[0];
        assert_eq!(row.district_name.as_deref(), Some("Downtown"));
        let w = row.weather.unwrap();
        assert_eq!(w.min_temp_c, Some(-5.0));
        assert_eq!(w.max_temp_c, Some(2.0));
        assert_eq!(w.total_precip_mm, Some(3.0));
        assert_eq!(
            row.location,
            Some(Coordinates {
                lon: -114.05,
                lat: 51.05
            })
        );
        assert_eq!(row.occurred_date, Some(date("2024-03-01")));
    }

    #[test]
    fn overlap_uses_lexical_first_name() {
        let (districts, weather) = fixtures();
        let joined = join_incidents(
            &[incident("A", "2024-03-01 08:15:00", Some("POINT(-114.05 51.04)"))],
            &districts,
            &weather,
        );
        assert_eq!(joined[0].district_name.as_deref(), Some("Beltline"));
    }

    #[test]
    fn keeps_every_incident_with_nulls_when_unmatched() {
        let (districts, weather) = fixtures();
        let incidents = vec![
            incident("outside", "2024-03-01 08:15:00", Some("POINT(-113.0 50.0)")),
            incident("unlocated", "2024-03-01 09:00:00", None),
            incident("no-weather", "2024-04-01 09:00:00", Some("POINT(-114.05 51.05)")),
            incident("bad-geom", "2024-03-01 09:00:00", Some("MULTIPOLYGON(((0 0, 1 0, 1 1, 0 0)))")),
            Incident {
                occurred_at: None,
                ..incident("no-date", "2024-03-01 09:00:00", Some("POINT(-114.05 51.05)"))
            },
        ];

        let joined = join_incidents(&incidents, &districts, &weather);
        assert_eq!(joined.len(), incidents.len(), "left-outer join must keep every incident");

        let ids: Vec<&str> = joined.iter().map(|j| j.incident_id.as_str()).collect();
        assert_eq!(ids, vec!["outside", "unlocated", "no-weather", "bad-geom", "no-date"]);

        assert!(joined[0].district_name.is_none());
        assert!(joined[0].weather.is_some());

        assert!(joined[1].district_name.is_none());
        assert!(joined[1].location.is_none());
        assert!(joined[1].weather.is_some(), "unlocated incidents still get weather");

        assert_eq!(joined[2].district_name.as_deref(), Some("Downtown"));
        assert!(joined[2].weather.is_none());

        assert!(joined[3].location.is_none());
        assert!(joined[3].district_name.is_none());

        assert!(joined[4].weather.is_none());
        assert!(joined[4].occurred_date.is_none());
    }

    #[test]
    fn join_is_order_independent() {
        let (districts, weather) = fixtures();
        let a = incident("A", "2024-03-01 08:15:00", Some("POINT(-114.05 51.05)"));
        let b = incident("B", "2024-03-01 10:00:00", Some("POINT(-114.05 51.04)"));

        let forwards = join_incidents(&[a.clone(), b.clone()], &districts, &weather);
        let backwards = join_incidents(&[b, a], &districts, &weather);

        assert_eq!(forwards[0], backwards[1]);
        assert_eq!(forwards[1], backwards[0]);
    }

    #[test]
    fn duplicate_weather_dates_keep_first() {
        let first = WeatherDay {
            date: date("2024-03-01"),
            min_temp_c: Some(1.0),
            max_temp_c: None,
            total_precip_mm: None,
        };
        let second = WeatherDay {
            min_temp_c: Some(9.0),
            ..first
        };
        let calendar = WeatherCalendar::new(&[first, second]);
        assert_eq!(calendar.len(), 1);
        assert_eq!(calendar.get(date("2024-03-01")).unwrap().min_temp_c, Some(1.0));
    }

    #[test]
    fn empty_inputs_produce_empty_output() {
        let joined = join_incidents(
            &[],
            &DistrictIndex::from_districts(&[]),
            &WeatherCalendar::default(),
        );
        assert!(joined.is_empty());
    }
}
