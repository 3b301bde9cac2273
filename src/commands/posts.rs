use anyhow::{Context as _, Result};
use std::io::Write;

use super::Context;
use crate::util::collapse_whitespace;

/// Longest description excerpt printed under a post.
const EXCERPT_CHARS: usize = 200;

/// Print the newest `limit` posts from feeds the current user follows.
pub async fn browse(ctx: &mut Context, out: &mut impl Write, limit: i64) -> Result<()> {
    let user = ctx.current_user().await?;
    let posts = ctx
        .db
        .posts_for_user(user.id, limit)
        .await
        .context("Failed to load posts")?;

    if posts.is_empty() {
        writeln!(out, "No posts yet. Run `gator agg 1m` to collect some.")?;
        return Ok(());
    }

    for post in posts {
        writeln!(out, "* {} ({})", post.title, post.url)?;
        if let Some(published) = post.published_at {
            writeln!(out, "  Published {}", published.format("%Y-%m-%d %H:%M UTC"))?;
        }
        if let Some(description) = post.description.as_deref() {
            let text = collapse_whitespace(description);
            if !text.is_empty() {
                writeln!(out, "  {}", excerpt(&text, EXCERPT_CHARS))?;
            }
        }
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}
