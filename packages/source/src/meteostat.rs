//! Meteostat bulk daily weather fetcher.
//!
//! The bulk export is one gzip-compressed CSV per station with no header
//! row and the columns `date, tavg, tmin, tmax, prcp, snow, wdir, wspd,
//! wpgt, pres, tsun`. Missing measurements are empty cells. Only the date,
//! minimum and maximum temperature, and total precipitation are kept.

use std::io::Read;

use accident_map_incident_models::WeatherDay;
use accident_map_source_models::WeatherConfig;
use chrono::NaiveDate;
use flate2::read::GzDecoder;

use crate::{SourceError, retry};

/// Default bulk export base URL.
pub const DEFAULT_BASE_URL: &str = "https://bulk.meteostat.net/v2/daily";

const DATE_COL: usize = 0;
const TMIN_COL: usize = 2;
const TMAX_COL: usize = 3;
const PRCP_COL: usize = 4;

/// Downloads and decodes the daily aggregates for the configured station,
/// keeping only dates within the configured range.
///
/// # Errors
///
/// Returns [`SourceError`] if the download fails or the payload is not a
/// readable gzip CSV.
pub async fn fetch_daily(
    client: &reqwest::Client,
    config: &WeatherConfig,
) -> Result<Vec<WeatherDay>, SourceError> {
    let WeatherConfig::Meteostat {
        station,
        start,
        end,
        base_url,
    } = config;

    let base = base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let url = format!("{}/{station}.csv.gz", base.trim_end_matches('/'));

    log::info!("Fetching weather for station {station} ({start} .. {end}) from {url}...");
    let compressed = retry::send_bytes(|| client.get(&url)).await?;
    let days = parse_daily_csv(GzDecoder::new(compressed.as_slice()), *start, *end)?;
    log::info!("Fetched {} weather records", days.len());

    Ok(days)
}

/// Parses an uncompressed daily CSV, keeping rows whose date lies in
/// `start..=end`. Rows with an unparseable date are skipped.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the stream is not valid CSV.
pub fn parse_daily_csv<R: Read>(
    reader: R,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<WeatherDay>, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut days = Vec::new();
    let mut skipped = 0usize;

    for record in csv_reader.records() {
        let record = record?;

        let Some(date) = record
            .get(DATE_COL)
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        else {
            skipped += 1;
            continue;
        };
        if date < start || date > end {
            continue;
        }

        days.push(WeatherDay {
            date,
            min_temp_c: measurement(record.get(TMIN_COL)),
            max_temp_c: measurement(record.get(TMAX_COL)),
            total_precip_mm: measurement(record.get(PRCP_COL)),
        });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} weather rows with an unreadable date");
    }

    Ok(days)
}

fn measurement(cell: Option<&str>) -> Option<f64> {
    cell.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
