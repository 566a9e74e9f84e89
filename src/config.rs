//! Configuration file parser for `feedgather.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde but reported back to the caller, which
//! logs them as potential typos once its subscriber is up.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Parsed but semantically unusable value.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level gatherer configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file, created if missing.
    pub database_path: PathBuf,
    pub gatherer: GathererConfig,
    pub fetcher: FetcherConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("feeds.db"),
            gatherer: GathererConfig::default(),
            fetcher: FetcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Output of [`Config::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub config: Config,
    /// Keys present in the file but not understood, as dotted paths
    /// (`gatherer.interval_minutez`).
    pub unknown_keys: Vec<String>,
    /// `false` when defaults were used because the file was missing or empty.
    pub from_file: bool,
}

impl LoadedConfig {
    fn defaults() -> Self {
        Self {
            config: Config::default(),
            unknown_keys: Vec::new(),
            from_file: false,
        }
    }

    /// Report what loading found. Call once a subscriber is installed.
    pub fn log_summary(&self, path: &Path) {
        if !self.from_file {
            tracing::debug!(path = %path.display(), "No config file content, using defaults");
            return;
        }
        for key in &self.unknown_keys {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
        tracing::info!(
            path = %path.display(),
            database = %self.config.database_path.display(),
            interval_minutes = self.config.gatherer.interval_minutes,
            "Loaded configuration"
        );
    }
}

/// What a worker does when one item of a channel fails to merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailurePolicy {
    /// Log the item and move on to the next one.
    #[default]
    Continue,
    /// Stop the channel; no fetch-log row is written.
    AbortChannel,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GathererConfig {
    /// Minutes between pass starts.
    pub interval_minutes: u64,
    pub item_failure_policy: ItemFailurePolicy,
}

impl Default for GathererConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 40,
            item_failure_policy: ItemFailurePolicy::Continue,
        }
    }
}

impl GathererConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// HTTP client settings for feed retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Per-attempt deadline covering connect, headers and body.
    pub timeout_secs: u64,
    pub max_idle_per_host: usize,
    /// Retries on 429, 5xx and truncated bodies. 0 = single attempt.
    pub max_retries: u32,
    /// Largest accepted response body in bytes.
    pub max_feed_size: usize,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 4,
            max_idle_per_host: 4,
            max_retries: 0,
            max_feed_size: 10 * 1024 * 1024,
            user_agent: concat!("feedgather/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Receives every event, in addition to stdout.
    pub info_log: Option<PathBuf>,
    /// Receives `ERROR` events only.
    pub error_log: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            info_log: None,
            error_log: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Upper bound for `fetcher.max_retries`.
    pub const MAX_RETRIES: u32 = 10;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → defaults
    /// - Empty file → defaults
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, reported in [`LoadedConfig::unknown_keys`]
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    ///
    /// Nothing is logged here: the caller usually installs its subscriber from
    /// the loaded config, then calls [`LoadedConfig::log_summary`].
    pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedConfig::defaults());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            // Deleted between metadata and read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedConfig::defaults());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(LoadedConfig::defaults());
        }

        let unknown_keys = content
            .parse::<toml::Table>()
            .map(|raw| unknown_keys(&raw))
            .unwrap_or_default();

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(LoadedConfig {
            config,
            unknown_keys,
            from_file: true,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path must not be empty".into()));
        }
        if self.gatherer.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "gatherer.interval_minutes must be greater than 0".into(),
            ));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.fetcher.max_retries > Self::MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "fetcher.max_retries must be at most {}",
                Self::MAX_RETRIES
            )));
        }
        if self.fetcher.max_feed_size == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.max_feed_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Dotted paths of keys the config structs do not know about.
fn unknown_keys(raw: &toml::Table) -> Vec<String> {
    const SECTIONS: [(&str, &[&str]); 3] = [
        ("gatherer", &["interval_minutes", "item_failure_policy"]),
        (
            "fetcher",
            &["timeout_secs", "max_idle_per_host", "max_retries", "max_feed_size", "user_agent"],
        ),
        ("logging", &["level", "info_log", "error_log"]),
    ];

    let mut unknown = Vec::new();
    for (key, value) in raw {
        if key == "database_path" {
            continue;
        }
        let Some((_, known)) = SECTIONS.iter().find(|(name, _)| *name == key.as_str()) else {
            unknown.push(key.clone());
            continue;
        };
        if let Some(table) = value.as_table() {
            unknown.extend(
                table
                    .keys()
                    .filter(|k| !known.contains(&k.as_str()))
                    .map(|sub| format!("{key}.{sub}")),
            );
        }
    }
    unknown
}

// ============================================================================
// Tests
// ============================================================================
