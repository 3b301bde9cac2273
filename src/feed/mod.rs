//! Feed ingestion: retrieval, RSS decoding and the periodic scheduler.
//!
//! - **Fetching**: single bounded HTTP GET per feed, cancellable on shutdown
//! - **Parsing**: RSS 2.0 decoding with HTML-entity normalisation
//! - **Dates**: best-effort publish-date normalisation
//! - **Scheduling**: one stalest feed per tick, duplicate-tolerant persistence
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{FeedFetcher, FetchConfig, Scheduler};
//!
//! let fetcher = FeedFetcher::new(&FetchConfig::default())?;
//! let scheduler = Scheduler::new(db, fetcher, Duration::from_secs(60));
//! scheduler.run(shutdown).await?;
//! ```

mod dates;
mod fetcher;
mod parser;
mod scheduler;

pub use dates::parse_published;
pub use fetcher::{
    FeedFetcher, FetchConfig, FetchError, DEFAULT_MAX_FEED_BYTES, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use parser::{parse_feed, ParseError, RssFeed, RssItem};
pub use scheduler::{IngestSummary, Scheduler, SchedulerError, TickOutcome, TickReport};
