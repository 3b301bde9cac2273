use anyhow::{bail, Context as _, Result};
use std::io::Write;

use super::Context;
use crate::storage::DatabaseError;

pub async fn register(ctx: &mut Context, out: &mut impl Write, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name cannot be empty");
    }

    let user = match ctx.db.create_user(name).await {
        Ok(user) => user,
        Err(DatabaseError::AlreadyExists(_)) => bail!("User {name:?} already exists"),
        Err(e) => return Err(e).context("Failed to create user"),
    };

    ctx.config
        .set_user(&user.name, &ctx.config_path)
        .context("Failed to save config")?;

    tracing::info!(user_id = user.id, user = %user.name, "Registered user");
    writeln!(out, "User {} created and logged in.", user.name)?;
    Ok(())
}

pub async fn login(ctx: &mut Context, out: &mut impl Write, name: &str) -> Result<()> {
    let user = match ctx.db.get_user(name.trim()).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound(_)) => {
            bail!("User {name:?} does not exist. Run `gator register {name}` first.")
        }
        Err(e) => return Err(e).context("Failed to look up user"),
    };

    ctx.config
        .set_user(&user.name, &ctx.config_path)
        .context("Failed to save config")?;

    writeln!(out, "Logged in as {}.", user.name)?;
    Ok(())
}

/// Delete every user. Feeds, follows and posts go with them.
pub async fn reset(ctx: &mut Context, out: &mut impl Write) -> Result<()> {
    let deleted = ctx
        .db
        .delete_all_users()
        .await
        .context("Failed to reset database")?;

    tracing::warn!(users = deleted, "Database reset");
    writeln!(out, "Deleted {deleted} users.")?;
    Ok(())
}

pub async fn list_users(ctx: &mut Context, out: &mut impl Write) -> Result<()> {
    let users = ctx.db.list_users().await.context("Failed to list users")?;
    if users.is_empty() {
        writeln!(out, "No users yet. Run `gator register <name>` to create one.")?;
        return Ok(());
    }

    let current = ctx.config.current_user_name.as_deref();
    for user in users {
        if current == Some(user.name.as_str()) {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}
