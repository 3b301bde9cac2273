//! Operator-facing subcommands.
//!
//! Each handler takes the shared [`Context`] and writes user-facing text to
//! an injected writer; diagnostics go through `tracing`.

mod agg;
mod feeds;
mod posts;
mod users;

use anyhow::{Context as _, Result};
use clap::Subcommand;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;
use crate::shutdown::Shutdown;
use crate::storage::{Database, User};

pub use agg::agg;
pub use feeds::{add_feed, follow, following, list_feeds, unfollow};
pub use posts::browse;
pub use users::{list_users, login, register, reset};

/// Default number of posts shown by `browse`.
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch to an existing user
    Login { name: String },
    /// Delete every user, along with their feeds, follows and posts
    Reset,
    /// List registered users
    Users,
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List every feed and who added it
    Feeds,
    /// Follow a feed someone already added
    Follow { url: String },
    /// List the feeds you follow
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from feeds you follow
    Browse {
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
    },
    /// Fetch feeds on a fixed interval until interrupted (e.g. `30s`, `1m`, `1h30m`)
    Agg {
        #[arg(value_name = "INTERVAL")]
        time_between_reqs: String,
    },
}

/// State shared by every command.
pub struct Context {
    pub db: Database,
    pub config: Config,
    /// Where `config` is persisted when the logged-in user changes
    pub config_path: PathBuf,
}

impl Context {
    /// The logged-in user, or an error telling the operator how to become one.
    pub async fn current_user(&self) -> Result<User> {
        let name = self
            .config
            .current_user_name
            .as_deref()
            .context("No user is logged in. Run `gator register <name>` or `gator login <name>` first.")?;

        self.db
            .get_user(name)
            .await
            .with_context(|| format!("Logged-in user {name:?} could not be loaded"))
    }
}

/// Dispatch `command`. Only `agg` observes `shutdown`.
pub async fn run(
    command: Command,
    ctx: &mut Context,
    out: &mut impl Write,
    shutdown: Shutdown,
) -> Result<()> {
    tracing::debug!(?command, "Running command");

    match command {
        Command::Register { name } => register(ctx, out, &name).await,
        Command::Login { name } => login(ctx, out, &name).await,
        Command::Reset => reset(ctx, out).await,
        Command::Users => list_users(ctx, out).await,
        Command::Addfeed { name, url } => add_feed(ctx, out, &name, &url).await,
        Command::Feeds => list_feeds(ctx, out).await,
        Command::Follow { url } => follow(ctx, out, &url).await,
        Command::Following => following(ctx, out).await,
        Command::Unfollow { url } => unfollow(ctx, out, &url).await,
        Command::Browse { limit } => browse(ctx, out, limit).await,
        Command::Agg { time_between_reqs } => agg(ctx, out, &time_between_reqs, shutdown).await,
    }
}
