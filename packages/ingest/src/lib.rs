#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Refresh pipeline for the accident map.
//!
//! A refresh pulls each feed once, replaces the staging relations that
//! returned data, joins every staged incident to its district and same-day
//! weather, persists the crosswalk, upserts the freshly pulled incidents
//! into the fact table, and finally ensures indexes and refreshes the
//! materialized view.
//!
//! Failures are contained per stage. A feed that cannot be fetched becomes
//! an empty batch; a store write that fails is recorded and the remaining
//! independent stages still run. The [`RefreshSummary`] reports what
//! happened.

pub mod config;
pub mod summary;

use accident_map_database::{facts, staging, store, views};
use accident_map_incident_models::{District, Incident, JoinedIncident, WeatherDay};
use accident_map_source::flatten::{FlatRecord, flatten};
use accident_map_source::records::{Extracted, districts_from_records, incidents_from_records};
use accident_map_source::{SourceError, meteostat, socrata};
use accident_map_source_models::{FeedKind, RegionDefinition};
use accident_map_spatial::DistrictIndex;
use accident_map_spatial::join::{WeatherCalendar, join_incidents};
use duckdb::Connection;

pub use summary::{FeedReport, RefreshSummary, RunStatus, Stage, StageFailure};

/// Errors that abort a command before a refresh starts.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Source setup error.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Store error.
    #[error(transparent)]
    Db(#[from] accident_map_database::DbError),

    /// The requested region is not configured.
    #[error("Unknown region: {message}")]
    UnknownRegion {
        /// The requested id and the available ones.
        message: String,
    },
}

/// One feed's pull, ready to stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedBatch<T> {
    /// Raw records received.
    pub fetched: usize,
    /// Records dropped during extraction.
    pub skipped: usize,
    /// Extracted rows.
    pub rows: Vec<T>,
    /// Fetch error, if the pull failed.
    pub error: Option<String>,
}

impl<T> FeedBatch<T> {
    /// A successful pull where every record became a row.
    #[must_use]
    pub fn from_rows(rows: Vec<T>) -> Self {
        Self {
            fetched: rows.len(),
            skipped: 0,
            rows,
            error: None,
        }
    }

    /// A successful pull that returned nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            fetched: 0,
            skipped: 0,
            rows: Vec::new(),
            error: None,
        }
    }

    /// A failed pull, substituted by an empty batch.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty()
        }
    }

    fn from_extracted(fetched: usize, extracted: Extracted<T>) -> Self {
        Self {
            fetched,
            skipped: extracted.skipped,
            rows: extracted.rows,
            error: None,
        }
    }
}

/// The three pulls of one refresh run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatches {
    /// Traffic incidents.
    pub traffic: FeedBatch<Incident>,
    /// Community district boundaries.
    pub boundaries: FeedBatch<District>,
    /// Daily weather.
    pub weather: FeedBatch<WeatherDay>,
}

/// Pulls every feed of `region`. Never fails: a feed that cannot be
/// fetched is returned as a failed, empty batch.
#[allow(clippy::future_not_send)]
pub async fn fetch_batches(client: &reqwest::Client, region: &RegionDefinition) -> SourceBatches {
    let limit = region.fetch_limit;

    let traffic = extract_feed(
        FeedKind::Traffic,
        socrata::fetch_records(client, &region.traffic, limit, "traffic").await,
        incidents_from_records,
    );
    let boundaries = extract_feed(
        FeedKind::Boundaries,
        socrata::fetch_records(client, &region.boundaries, limit, "boundaries").await,
        districts_from_records,
    );
    let weather = match meteostat::fetch_daily(client, &region.weather).await {
        Ok(days) => FeedBatch::from_rows(days),
        Err(e) => {
            log::warn!("Error fetching weather data: {e}");
            FeedBatch::failed(e.to_string())
        }
    };

    SourceBatches {
        traffic,
        boundaries,
        weather,
    }
}

fn extract_feed<T>(
    kind: FeedKind,
    fetched: Result<Vec<serde_json::Value>, SourceError>,
    extract: fn(&[FlatRecord]) -> Extracted<T>,
) -> FeedBatch<T> {
    match fetched {
        Ok(raw) => FeedBatch::from_extracted(raw.len(), extract(&flatten(&raw))),
        Err(e) => {
            log::warn!("Error fetching {kind} data: {e}");
            FeedBatch::failed(e.to_string())
        }
    }
}

/// Fetches every feed of `region` and runs the store pipeline on the
/// result.
#[allow(clippy::future_not_send)]
pub async fn run_refresh(
    conn: &mut Connection,
    client: &reqwest::Client,
    region: &RegionDefinition,
) -> RefreshSummary {
    log::info!(
        "Refreshing {} (limit {} records per feed)",
        region.name(),
        region.fetch_limit
    );
    let batches = fetch_batches(client, region).await;
    refresh_from_batches(conn, region.id(), batches)
}

/// Runs the store side of a refresh on already fetched batches: staging
/// loads, join, crosswalk, fact sync, indexes, view, and metadata.
///
/// Facts are synced only from the incidents pulled in this run; an empty or
/// failed traffic pull syncs nothing.
pub fn refresh_from_batches(
    conn: &mut Connection,
    region_id: &str,
    batches: SourceBatches,
) -> RefreshSummary {
    let mut summary = RefreshSummary::new(region_id);

    let traffic_staged = stage_feed(
        conn,
        &mut summary,
        FeedKind::Traffic,
        &batches.traffic,
        staging::replace_incidents,
    );
    stage_feed(
        conn,
        &mut summary,
        FeedKind::Boundaries,
        &batches.boundaries,
        staging::replace_districts,
    );
    stage_feed(
        conn,
        &mut summary,
        FeedKind::Weather,
        &batches.weather,
        staging::replace_weather,
    );

    match join_staged(conn) {
        Ok((joined, districts, calendar)) => {
            summary.joined = joined.len();

            if let Err(e) = staging::replace_attribution(conn, &joined) {
                summary.fail(Stage::Attribution, None, e.to_string());
            }

            let fact_rows = if traffic_staged {
                joined
            } else {
                join_incidents(&batches.traffic.rows, &districts, &calendar)
            };
            match facts::sync(conn, &fact_rows) {
                Ok(outcome) => summary.facts = outcome,
                Err(e) => summary.fail(Stage::FactSync, None, e.to_string()),
            }
        }
        Err(e) => summary.fail(Stage::Join, None, e.to_string()),
    }

    if let Err(e) = views::ensure_indexes(conn) {
        summary.fail(Stage::Indexes, None, e.to_string());
    }
    match views::refresh_materialized_view(conn) {
        Ok(rows) => summary.view_rows = Some(rows),
        Err(e) => summary.fail(Stage::View, None, e.to_string()),
    }
    if let Err(e) = store::record_refresh(conn) {
        summary.fail(Stage::Metadata, None, e.to_string());
    }

    log::info!("Refresh of {region_id} finished: {}", summary.status());
    summary
}

/// Replaces one staging relation. Returns `true` if new rows were staged.
fn stage_feed<T>(
    conn: &mut Connection,
    summary: &mut RefreshSummary,
    kind: FeedKind,
    batch: &FeedBatch<T>,
    replace: fn(&mut Connection, &[T]) -> Result<usize, accident_map_database::DbError>,
) -> bool {
    let mut report = FeedReport {
        kind,
        fetched: batch.fetched,
        skipped: batch.skipped,
        loaded: 0,
    };

    if let Some(error) = &batch.error {
        summary.fail(Stage::Fetch, Some(kind), error.clone());
    }

    if batch.rows.is_empty() {
        log::warn!("No {kind} data fetched; keeping previously staged rows");
        summary.feeds.push(report);
        return false;
    }

    let staged = match replace(conn, &batch.rows) {
        Ok(loaded) => {
            report.loaded = loaded;
            true
        }
        Err(e) => {
            summary.fail(Stage::Load, Some(kind), e.to_string());
            false
        }
    };
    summary.feeds.push(report);
    staged
}

fn join_staged(
    conn: &Connection,
) -> Result<(Vec<JoinedIncident>, DistrictIndex, WeatherCalendar), accident_map_database::DbError>
{
    let incidents = staging::read_incidents(conn)?;
    let districts = DistrictIndex::from_districts(&staging::read_districts(conn)?);
    let calendar = WeatherCalendar::new(&staging::read_weather(conn)?);

    let joined = join_incidents(&incidents, &districts, &calendar);
    Ok((joined, districts, calendar))
}
