//! Run summary for a refresh.

use std::fmt;

use accident_map_database::facts::SyncOutcome;
use accident_map_source_models::FeedKind;
use strum_macros::{AsRefStr, Display, EnumString};

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Pulling a feed.
    Fetch,
    /// Replacing a staging relation.
    Load,
    /// Reading staging and computing the spatial/temporal join.
    Join,
    /// Persisting the district crosswalk.
    Attribution,
    /// Upserting facts.
    FactSync,
    /// Creating secondary indexes.
    Indexes,
    /// Refreshing the materialized view.
    View,
    /// Recording run metadata.
    Metadata,
}

/// Overall outcome of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// Every stage succeeded.
    Complete,
    /// At least one stage failed; the stages after it still ran.
    Partial,
}

/// A failed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// The stage that failed.
    pub stage: Stage,
    /// The feed involved, for fetch and load failures.
    pub feed: Option<FeedKind>,
    /// Error description.
    pub message: String,
}

/// Per-feed counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedReport {
    /// Which feed.
    pub kind: FeedKind,
    /// Raw records received.
    pub fetched: usize,
    /// Records dropped during extraction.
    pub skipped: usize,
    /// Rows written to the staging relation.
    pub loaded: usize,
}

/// Counts and failures for one refresh run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Region identifier.
    pub region: String,
    /// One entry per feed, in traffic/boundaries/weather order.
    pub feeds: Vec<FeedReport>,
    /// Incidents joined from staging.
    pub joined: usize,
    /// Fact synchronizer outcome.
    pub facts: SyncOutcome,
    /// Rows in the refreshed view, if the refresh succeeded.
    pub view_rows: Option<u64>,
    /// Failed stages, in the order they happened.
    pub failures: Vec<StageFailure>,
}

impl RefreshSummary {
    /// Creates an empty summary for `region`.
    #[must_use]
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            feeds: Vec::new(),
            joined: 0,
            facts: SyncOutcome::default(),
            view_rows: None,
            failures: Vec::new(),
        }
    }

    /// Records a failed stage and logs it.
    pub fn fail(&mut self, stage: Stage, feed: Option<FeedKind>, message: impl Into<String>) {
        let message = message.into();
        match feed {
            Some(kind) => log::error!("{stage} failed for {kind}: {message}"),
            None => log::error!("{stage} failed: {message}"),
        }
        self.failures.push(StageFailure {
            stage,
            feed,
            message,
        });
    }

    /// `Complete` when no stage failed, otherwise `Partial`.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.failures.is_empty() {
            RunStatus::Complete
        } else {
            RunStatus::Partial
        }
    }

    /// Report for a feed, if it was processed.
    #[must_use]
    pub fn feed(&self, kind: FeedKind) -> Option<&FeedReport> {
        self.feeds.iter().find(|f| f.kind == kind)
    }
}

impl fmt::Display for RefreshSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Refresh of {}: {}", self.region, self.status())?;
        writeln!(f, "{:<12} {:>9} {:>9} {:>9}", "FEED", "FETCHED", "SKIPPED", "LOADED")?;
        writeln!(f, "{}", "-".repeat(42))?;
        for feed in &self.feeds {
            write!(
                f,
                "{:<12} {:>9} {:>9} {:>9}",
                feed.kind.as_ref(),
                feed.fetched,
                feed.skipped,
                feed.loaded
            )?;
            if feed.fetched == 0 {
                write!(f, "  (no {} data fetched)", feed.kind)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Joined incidents: {}", self.joined)?;
        writeln!(
            f,
            "Facts: {} inserted, {} updated, {} unchanged",
            self.facts.inserted, self.facts.updated, self.facts.unchanged
        )?;
        match self.view_rows {
            Some(rows) => writeln!(f, "View rows: {rows}")?,
            None => writeln!(f, "View rows: not refreshed")?,
        }
        for failure in &self.failures {
            match failure.feed {
                Some(kind) => writeln!(f, "FAILED {} ({kind}): {}", failure.stage, failure.message)?,
                None => writeln!(f, "FAILED {}: {}", failure.stage, failure.message)?,
            }
        }
        Ok(())
    }
}
