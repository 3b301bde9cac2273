use anyhow::{bail, Context as _, Result};
use std::io::Write;
use url::Url;

use super::Context;
use crate::storage::DatabaseError;
use crate::util::validate_feed_url;

/// Register a new feed owned by the current user and follow it.
pub async fn add_feed(ctx: &mut Context, out: &mut impl Write, name: &str, url: &str) -> Result<()> {
    let user = ctx.current_user().await?;

    let name = name.trim();
    if name.is_empty() {
        bail!("Feed name cannot be empty");
    }
    let url = validate_feed_url(url, ctx.config.allow_private_feeds)
        .with_context(|| format!("Refusing to add feed {url:?}"))?;

    let feed = match ctx.db.create_feed(name, url.as_str(), user.id).await {
        Ok(feed) => feed,
        Err(DatabaseError::AlreadyExists(_)) => {
            bail!("Feed {url} was already added. Run `gator follow {url}` to follow it.")
        }
        Err(e) => return Err(e).context("Failed to add feed"),
    };
    let follow = ctx
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("Feed added, but following it failed")?;

    tracing::info!(feed_id = feed.id, url = %feed.url, user = %user.name, "Added feed");
    writeln!(out, "Added feed {} ({}).", feed.name, feed.url)?;
    writeln!(out, "{} now follows {}.", follow.user_name, follow.feed_name)?;
    Ok(())
}

pub async fn list_feeds(ctx: &mut Context, out: &mut impl Write) -> Result<()> {
    let feeds = ctx
        .db
        .list_feeds_with_owner()
        .await
        .context("Failed to list feeds")?;
    if feeds.is_empty() {
        writeln!(out, "No feeds yet. Run `gator addfeed <name> <url>` to add one.")?;
        return Ok(());
    }

    for entry in feeds {
        writeln!(
            out,
            "* {} ({}) - {}",
            entry.feed.name, entry.feed.url, entry.owner_name
        )?;
    }
    Ok(())
}

pub async fn follow(ctx: &mut Context, out: &mut impl Write, url: &str) -> Result<()> {
    let user = ctx.current_user().await?;
    let url = normalize_url(url);

    let feed = match ctx.db.get_feed_by_url(&url).await {
        Ok(feed) => feed,
        Err(DatabaseError::NotFound(_)) => {
            bail!("No feed with URL {url}. Run `gator addfeed <name> {url}` to add it.")
        }
        Err(e) => return Err(e).context("Failed to look up feed"),
    };

    let follow = match ctx.db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => follow,
        Err(DatabaseError::AlreadyExists(_)) => {
            bail!("{} already follows {}", user.name, feed.name)
        }
        Err(e) => return Err(e).context("Failed to follow feed"),
    };

    writeln!(out, "{} now follows {}.", follow.user_name, follow.feed_name)?;
    Ok(())
}

pub async fn following(ctx: &mut Context, out: &mut impl Write) -> Result<()> {
    let user = ctx.current_user().await?;
    let follows = ctx
        .db
        .list_follows_for_user(user.id)
        .await
        .context("Failed to list follows")?;

    if follows.is_empty() {
        writeln!(out, "{} is not following any feeds.", user.name)?;
        return Ok(());
    }
    for follow in follows {
        writeln!(out, "* {}", follow.feed_name)?;
    }
    Ok(())
}

pub async fn unfollow(ctx: &mut Context, out: &mut impl Write, url: &str) -> Result<()> {
    let user = ctx.current_user().await?;
    let url = normalize_url(url);

    match ctx.db.delete_feed_follow(user.id, &url).await {
        Ok(()) => {}
        Err(DatabaseError::NotFound(_)) => bail!("{} does not follow {url}", user.name),
        Err(e) => return Err(e).context("Failed to unfollow feed"),
    }

    writeln!(out, "{} unfollowed {url}.", user.name)?;
    Ok(())
}

/// Spell a URL the way `addfeed` stored it, so `https://example.com` matches
/// `https://example.com/`. Unparseable input is looked up as given.
fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    Url::parse(raw).map(String::from).unwrap_or_else(|_| raw.to_string())
}
