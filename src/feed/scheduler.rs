use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::dates::parse_published;
use super::fetcher::{FeedFetcher, FetchError};
use super::parser::{parse_feed, ParseError, RssItem};
use crate::shutdown::Shutdown;
use crate::storage::{DatabaseError, Feed, FeedStore, InsertPostError, NewPost};

const UNTITLED: &str = "Untitled";

/// Store failures that end a tick before any feed is fetched.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Could not select the next feed: {0}")]
    Select(#[source] DatabaseError),
    #[error("Could not mark feed {feed_id} as fetched: {source}")]
    Claim {
        feed_id: i64,
        #[source]
        source: DatabaseError,
    },
}

/// Per-item results of persisting one parsed feed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub created: usize,
    /// Items whose URL was already stored
    pub duplicates: usize,
    /// Items that hit a non-duplicate storage error
    pub failed: usize,
    /// Items without a link
    pub skipped: usize,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// There are no feeds at all
    NoFeeds,
    FetchFailed(FetchError),
    ParseFailed(ParseError),
    Ingested(IngestSummary),
}

/// What one tick did. `feed` is the claimed feed, `None` only for `NoFeeds`.
#[derive(Debug)]
pub struct TickReport {
    pub feed: Option<Feed>,
    pub outcome: TickOutcome,
}

/// Periodic feed ingestion: one feed per tick, stalest first.
///
/// Each tick selects the feed with the oldest `last_fetched_at`, claims it by
/// stamping the current time, then fetches, parses and stores its items.
/// Fetch and parse failures only affect that feed for that round; duplicate
/// post URLs are counted, not reported as errors.
pub struct Scheduler<S> {
    store: S,
    fetcher: FeedFetcher,
    interval: Duration,
}

impl<S: FeedStore> Scheduler<S> {
    pub fn new(store: S, fetcher: FeedFetcher, interval: Duration) -> Self {
        Self {
            store,
            fetcher,
            interval,
        }
    }

    /// Process exactly one feed.
    ///
    /// # Errors
    ///
    /// Only store failures while selecting or claiming the feed are returned.
    /// Everything after the claim ends up in [`TickReport::outcome`].
    pub async fn tick(&self, shutdown: &mut Shutdown) -> Result<TickReport, SchedulerError> {
        let Some(feed) = self
            .store
            .next_feed_to_fetch()
            .await
            .map_err(SchedulerError::Select)?
        else {
            return Ok(TickReport {
                feed: None,
                outcome: TickOutcome::NoFeeds,
            });
        };

        // Claim before fetching so a slow or broken feed still gives up its turn.
        self.store
            .mark_feed_fetched(feed.id, Utc::now())
            .await
            .map_err(|source| SchedulerError::Claim {
                feed_id: feed.id,
                source,
            })?;

        let outcome = match self.fetcher.fetch(&feed.url, shutdown).await {
            Err(e) => TickOutcome::FetchFailed(e),
            Ok(bytes) => match parse_feed(&bytes) {
                Err(e) => TickOutcome::ParseFailed(e),
                Ok(rss) => TickOutcome::Ingested(self.persist(&feed, rss.items).await),
            },
        };

        Ok(TickReport {
            feed: Some(feed),
            outcome,
        })
    }

    /// Insert every item, isolating failures per item.
    async fn persist(&self, feed: &Feed, items: Vec<RssItem>) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for item in items {
            let Some(post) = new_post(feed.id, item) else {
                summary.skipped += 1;
                continue;
            };

            match self.store.insert_post(&post).await {
                Ok(_) => summary.created += 1,
                Err(InsertPostError::DuplicateUrl(_)) => summary.duplicates += 1,
                Err(InsertPostError::Other(e)) => {
                    summary.failed += 1;
                    warn!(feed = %feed.url, post = %post.url, error = %e, "Failed to store post");
                }
            }
        }

        summary
    }

    /// Tick on a fixed interval until `shutdown` fires.
    ///
    /// The first tick runs immediately. Ticks never overlap and missed ticks
    /// are delayed rather than bunched up.
    ///
    /// # Errors
    ///
    /// A store failure on the first tick is returned. Failures on later
    /// ticks are logged and the loop keeps going.
    pub async fn run(&self, mut shutdown: Shutdown) -> Result<(), SchedulerError> {
        info!(interval = ?self.interval, "Collecting feeds");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut first_tick = true;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {}
            }

            match self.tick(&mut shutdown).await {
                Ok(report) => log_report(&report),
                Err(e) if first_tick => return Err(e),
                Err(e) => error!(error = %e, "Tick failed, retrying next interval"),
            }
            first_tick = false;
        }

        info!("Feed collection stopped");
        Ok(())
    }
}

/// Map a parsed item to a post row. Items without a link cannot be stored.
fn new_post(feed_id: i64, item: RssItem) -> Option<NewPost> {
    if item.link.is_empty() {
        return None;
    }

    let title = if item.title.is_empty() {
        UNTITLED.to_string()
    } else {
        item.title
    };

    Some(NewPost {
        feed_id,
        title,
        description: Some(item.description).filter(|d| !d.is_empty()),
        published_at: parse_published(&item.pub_date),
        url: item.link,
    })
}

fn log_report(report: &TickReport) {
    let Some(feed) = &report.feed else {
        debug!("No feeds to collect");
        return;
    };

    match &report.outcome {
        TickOutcome::NoFeeds => {}
        TickOutcome::FetchFailed(FetchError::Cancelled) => {
            debug!(feed = %feed.url, "Fetch cancelled by shutdown");
        }
        TickOutcome::FetchFailed(e) => {
            warn!(feed = %feed.url, name = %feed.name, error = %e, "Failed to fetch feed");
        }
        TickOutcome::ParseFailed(e) => {
            warn!(feed = %feed.url, name = %feed.name, error = %e, "Failed to parse feed");
        }
        TickOutcome::Ingested(summary) => {
            info!(
                feed = %feed.url,
                name = %feed.name,
                created = summary.created,
                duplicates = summary.duplicates,
                failed = summary.failed,
                skipped = summary.skipped,
                "Collected feed"
            );
        }
    }
}
