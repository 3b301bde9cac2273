//! gator: a multi-user RSS aggregator.
//!
//! Users follow feeds; the aggregator (`gator agg`) periodically fetches the
//! stalest feed and stores its posts; `gator browse` shows the newest posts
//! from followed feeds.

pub mod commands;
pub mod config;
pub mod feed;
pub mod shutdown;
pub mod storage;
pub mod util;
