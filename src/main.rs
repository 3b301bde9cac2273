use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gator::commands::{self, Command, Context};
use gator::config::Config;
use gator::shutdown::{self, Shutdown, ShutdownTrigger};
use gator::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Multi-user RSS aggregator")]
struct Args {
    /// Config file (default: ~/.gatorconfig.json)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()
            .context("HOME environment variable not set; pass --config <FILE>")?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.db_path();
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::Locked) => {
            anyhow::bail!(
                "Database {} is locked by another gator process. Try again shortly.",
                db_path.display()
            );
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open database {}", db_path.display()))
        }
    };

    // Only the long-running aggregator takes over Ctrl-C; one-shot commands
    // keep the default signal behaviour.
    let shutdown = if matches!(args.command, Command::Agg { .. }) {
        let (trigger, shutdown) = shutdown::channel();
        tokio::spawn(forward_signals(trigger));
        shutdown
    } else {
        Shutdown::never()
    };

    let mut ctx = Context {
        db,
        config,
        config_path,
    };
    let mut stdout = std::io::stdout();
    commands::run(args.command, &mut ctx, &mut stdout, shutdown).await
}

/// Trigger shutdown on Ctrl-C or SIGTERM.
async fn forward_signals(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown requested, finishing current feed");
    trigger.trigger();
}
