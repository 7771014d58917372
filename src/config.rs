use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::api::{DEFAULT_API_BASE, DEFAULT_TIMEOUT, RetryPolicy};
use crate::classify::{Bounds, DuplicateDestination, FeatureBounds, Rule, RuleTable};
use crate::schedule::{Schedule, ScheduleConfig};
use crate::sync::SyncConfig;
use crate::writer::DEFAULT_DESCRIPTION;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid schedule: {0}")]
    Schedule(String),
    #[error(transparent)]
    Rules(#[from] DuplicateDestination),
}

/// Application configuration loaded from TOML config file.
/// Every field has a default; the file itself is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Web API root (tests and proxies point this elsewhere).
    pub api_base: Option<String>,
    /// Description for playlists the sorter creates.
    pub description: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Daily trigger time.
    pub schedule: ScheduleConfig,
    /// Backoff for rate limiting and server errors.
    pub retry: RetryPolicy,
    /// Destination rules in priority order. Empty = built-in mood table.
    pub rules: Vec<RuleConfig>,
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub playlist: String,
    #[serde(default)]
    pub energy: Bounds,
    #[serde(default)]
    pub valence: Bounds,
}

impl AppConfig {
    /// Load config from `path`, or from `~/.config/moodsort/config.toml`.
    ///
    /// A missing default file means defaults; an explicit path must exist.
    /// A file that exists but can't be read or parsed is an error, since a
    /// silently defaulted rule table would overwrite the wrong playlists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::config_path() {
                Some(p) if p.exists() => p,
                _ => {
                    log::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        Schedule::from_config(&self.schedule).map_err(ConfigError::Schedule)
    }

    /// Rule table from `[[rules]]`, or the built-in table when none are given.
    pub fn rule_table(&self) -> Result<RuleTable, ConfigError> {
        if self.rules.is_empty() {
            return Ok(RuleTable::default());
        }
        let rules = self
            .rules
            .iter()
            .map(|r| {
                Rule::bounded(
                    r.playlist.clone(),
                    FeatureBounds {
                        energy: r.energy,
                        valence: r.valence,
                    },
                )
            })
            .collect();
        Ok(RuleTable::new(rules)?)
    }

    /// Combine the file settings with the per-process values.
    pub fn sync_config(
        &self,
        user_id: &str,
        master_name: &str,
        dry_run: bool,
    ) -> Result<SyncConfig, ConfigError> {
        Ok(SyncConfig {
            api_base: self.api_base().to_string(),
            user_id: user_id.trim().to_string(),
            master_name: master_name.to_string(),
            dry_run,
            rules: self.rule_table()?,
            schedule: self.schedule()?,
            description: self
                .description
                .clone()
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        })
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Truthiness of an environment toggle: `1`, `true`, `yes` (any case).
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
