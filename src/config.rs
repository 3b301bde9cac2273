//! Configuration file for gator, `~/.gatorconfig.json` by default.
//!
//! The file is optional: a missing or empty file yields `Config::default()`.
//! Unknown keys are ignored. The file also records which user is logged in,
//! so commands like `login` and `register` rewrite it.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchConfig, DEFAULT_MAX_FEED_BYTES, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

pub const CONFIG_FILE_NAME: &str = ".gatorconfig.json";
const DEFAULT_DB_FILE_NAME: &str = ".gator.db";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path. Empty means `~/.gator.db`.
    pub db_url: String,

    /// User the CLI acts as; set by `register` and `login`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// `User-Agent` sent with every feed request.
    pub user_agent: String,

    /// Deadline for one feed request, body included.
    pub fetch_timeout_secs: u64,

    /// Largest feed document accepted.
    pub max_feed_bytes: usize,

    /// Allow feeds on localhost and private networks.
    pub allow_private_feeds: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: String::new(),
            current_user_name: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_BYTES,
            allow_private_feeds: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// `~/.gatorconfig.json`, or `None` if `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from a JSON file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid JSON or wrong types → `Err(ConfigError::Parse)`
    /// - Larger than 1 MB → `Err(ConfigError::TooLarge)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config: Config = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            user = ?config.current_user_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the config as pretty JSON, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut content = serde_json::to_vec_pretty(self)?;
        content.push(b'\n');
        write_atomic(path, &content)
    }

    /// Switch the logged-in user and persist the change.
    pub fn set_user(&mut self, name: &str, path: &Path) -> Result<(), ConfigError> {
        self.current_user_name = Some(name.to_string());
        self.save(path)
    }

    /// Database path, falling back to `~/.gator.db` (or `./.gator.db` without `HOME`).
    pub fn db_path(&self) -> PathBuf {
        if !self.db_url.trim().is_empty() {
            return PathBuf::from(self.db_url.trim());
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(DEFAULT_DB_FILE_NAME)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let defaults = FetchConfig::default();
        FetchConfig {
            user_agent: if self.user_agent.trim().is_empty() {
                defaults.user_agent
            } else {
                self.user_agent.clone()
            },
            timeout: match self.fetch_timeout_secs {
                0 => defaults.timeout,
                secs => Duration::from_secs(secs),
            },
            max_bytes: match self.max_feed_bytes {
                0 => defaults.max_bytes,
                bytes => bytes,
            },
            ..defaults
        }
    }
}

/// Replace `dst` with `content` via a uniquely named temp file and rename,
/// so readers never see a partially written config.
fn write_atomic(dst: &Path, content: &[u8]) -> Result<(), ConfigError> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let file_name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| CONFIG_FILE_NAME.to_string());
    let temp_path = dst.with_file_name(format!("{file_name}.tmp.{suffix:016x}"));

    let result = (|| {
        let mut temp_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp_file.write_all(content)?;
        temp_file.sync_all()?;
        drop(temp_file);

        #[cfg(windows)]
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }
        std::fs::rename(&temp_path, dst)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(ConfigError::Io(e));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
