//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::locking::{RetryPolicy, local_holder_identity};
use crate::error::Error;

/// Synclock configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locks: LockConfig,
    pub engine: EngineConfig,
}

/// `[locks]` section: retry settings for the acquire protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Number of additional attempts after the first failed acquire
    pub lock_retry_times: u32,
    /// Seconds between attempts
    pub lock_retry_interval: u64,
}

/// `[engine]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed holder identity; generated per process when unset
    pub holder_identity: Option<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_retry_times: 3,
            lock_retry_interval: 10,
        }
    }
}

impl LockConfig {
    /// Retry policy described by this section
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(self)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SYNCLOCK_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("synclock")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory: {}", dir.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(identity) = &self.engine.holder_identity
            && identity.trim().is_empty()
        {
            return Err(Error::ConfigError(
                "engine.holder_identity must not be empty when set".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Retry policy for the lock coordinator
    pub fn retry_policy(&self) -> RetryPolicy {
        self.locks.retry_policy()
    }

    /// Holder identity for this process: the configured one, or a generated one
    pub fn holder_identity(&self) -> String {
        self.engine
            .holder_identity
            .clone()
            .unwrap_or_else(local_holder_identity)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Lock settings
            "locks.lock_retry_times" => Ok(self.locks.lock_retry_times.to_string()),
            "locks.lock_retry_interval" => Ok(self.locks.lock_retry_interval.to_string()),

            // Engine settings
            "engine.holder_identity" => Ok(self
                .engine
                .holder_identity
                .clone()
                .unwrap_or_else(|| "(not set - generated per process)".to_string())),

            _ => Err(unknown_key(key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "locks.lock_retry_times" => {
                self.locks.lock_retry_times = value.parse().map_err(|_| {
                    Error::ConfigError(format!("Invalid lock_retry_times value: {}", value))
                })?;
            }
            "locks.lock_retry_interval" => {
                self.locks.lock_retry_interval = value.parse().map_err(|_| {
                    Error::ConfigError(format!("Invalid lock_retry_interval value: {}", value))
                })?;
            }
            "engine.holder_identity" => {
                let value = value.trim();
                if value.is_empty() {
                    return Err(
                        Error::ConfigError("Holder identity must not be empty".to_string()).into(),
                    );
                }
                self.engine.holder_identity = Some(value.to_string());
            }

            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "locks.lock_retry_times",
            "locks.lock_retry_interval",
            "engine.holder_identity",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> anyhow::Error {
    Error::ConfigError(format!(
        "Unknown configuration key: {}. Use `synclock config list` to see available keys.",
        key
    ))
    .into()
}
