use anyhow::{Context as _, Result};
use std::io::Write;

use super::Context;
use crate::feed::{FeedFetcher, Scheduler};
use crate::shutdown::Shutdown;
use crate::util::parse_duration;

/// Run the ingestion scheduler every `interval` until `shutdown` fires.
///
/// The interval is validated before anything is fetched, so a typo fails
/// immediately instead of after the first tick.
pub async fn agg(
    ctx: &mut Context,
    out: &mut impl Write,
    interval: &str,
    shutdown: Shutdown,
) -> Result<()> {
    let interval = parse_duration(interval)
        .with_context(|| format!("Invalid interval {interval:?} (try `30s`, `1m` or `1h30m`)"))?;
    let fetcher = FeedFetcher::new(&ctx.config.fetch_config()).context("Failed to set up HTTP client")?;

    writeln!(out, "Collecting feeds every {interval:?}")?;
    out.flush()?;

    Scheduler::new(ctx.db.clone(), fetcher, interval)
        .run(shutdown)
        .await
        .context("Feed collection aborted")?;

    writeln!(out, "Stopped collecting feeds.")?;
    Ok(())
}
