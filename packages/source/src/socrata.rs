//! Socrata-style record feed fetcher.
//!
//! Pages through a dataset with `$limit`/`$offset` until the region's fetch
//! limit is reached or a short page comes back. Responses may be `GeoJSON`
//! feature collections (`.geojson` resources) or bare JSON arrays (`.json`
//! resources); both reduce to a list of records.

use accident_map_source_models::FeedConfig;
use serde_json::Value;

use crate::{SourceError, retry};

/// Largest page requested in a single call.
const PAGE_SIZE: u64 = 50_000;

/// Fetches up to `limit` raw records from a feed.
///
/// # Errors
///
/// Returns [`SourceError`] if a request fails after retries or a response
/// is neither a feature collection nor an array.
pub async fn fetch_records(
    client: &reqwest::Client,
    feed: &FeedConfig,
    limit: u64,
    label: &str,
) -> Result<Vec<Value>, SourceError> {
    match feed {
        FeedConfig::Socrata { url } => fetch_paged(client, url, limit, label).await,
        FeedConfig::GeojsonUrl { url } => {
            log::info!("Fetching {label} data from {url}...");
            let body = retry::send_json(|| client.get(url)).await?;
            let mut records = records_from_body(body)?;
            records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            log::info!("Downloaded {} {label} records", records.len());
            Ok(records)
        }
    }
}

async fn fetch_paged(
    client: &reqwest::Client,
    url: &str,
    limit: u64,
    label: &str,
) -> Result<Vec<Value>, SourceError> {
    let mut all_records: Vec<Value> = Vec::new();
    let mut offset: u64 = 0;

    loop {
        let remaining = limit.saturating_sub(offset);
        if remaining == 0 {
            break;
        }
        let page_limit = remaining.min(PAGE_SIZE);

        log::info!("Fetching {label} data: offset={offset}, limit={page_limit}");
        let params = [
            ("$limit", page_limit.to_string()),
            ("$offset", offset.to_string()),
            ("$order", ":id".to_string()),
        ];
        let body = retry::send_json(|| client.get(url).query(&params)).await?;
        let records = records_from_body(body)?;

        let count = records.len() as u64;
        all_records.extend(records);
        offset += count;

        if count < page_limit {
            break;
        }
    }

    log::info!("Downloaded {} {label} records total", all_records.len());
    Ok(all_records)
}

/// Extracts the record list from a response body.
///
/// A `GeoJSON` `FeatureCollection` yields its features, a JSON array yields
/// its elements, and `null` yields nothing.
///
/// # Errors
///
/// Returns [`SourceError::Normalization`] for any other shape, such as a
/// Socrata error object.
pub fn records_from_body(body: Value) -> Result<Vec<Value>, SourceError> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut object) => match object.remove("features") {
            Some(Value::Array(features)) => Ok(features),
            Some(Value::Null) => Ok(Vec::new()),
            _ => {
                let message = object
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("object without features");
                Err(SourceError::Normalization {
                    message: format!("Unexpected response: {message}"),
                })
            }
        },
        other => Err(SourceError::Normalization {
            message: format!("Unexpected response: {other}"),
        }),
    }
}
