//! Run configuration.
//!
//! Loaded once from an optional `spindle.toml` and then passed by reference
//! to every stage of the pipeline. Every field has a default, so an empty or
//! missing file is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "spindle.toml";

/// Errors that can occur when loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML or does not match the schema.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Immutable settings for one repository build.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the package-metadata tree.
    pub target_dir: PathBuf,
    /// Directory the repository is written to.
    pub output_dir: PathBuf,
    /// File-name suffixes recognised as launchable binaries.
    pub valid_binary_extensions: Vec<String>,
    /// Packages assembled concurrently. `1` builds strictly in order.
    pub jobs: usize,
    /// Per-request timeout for asset downloads.
    pub fetch_timeout_secs: u64,
    /// Extra attempts for downloads that fail transiently.
    pub fetch_retries: u32,
    /// User agent sent with asset downloads.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("."),
            output_dir: PathBuf::from("public"),
            valid_binary_extensions: [".nro", ".elf", ".rpx", ".cia", ".3dsx"]
                .into_iter()
                .map(String::from)
                .collect(),
            jobs: 1,
            fetch_timeout_secs: 300,
            fetch_retries: 2,
            user_agent: crate::USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Load a configuration file, falling back to defaults when it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file exists but cannot be read, or
    /// `ConfigError::Parse` if its content is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the text is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Download timeout as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Worker count, never less than one.
    pub fn effective_jobs(&self) -> usize {
        self.jobs.max(1)
    }

    /// Whether a file name carries one of the configured binary extensions.
    pub fn is_binary(&self, file_name: &str) -> bool {
        self.valid_binary_extensions
            .iter()
            .any(|ext| file_name.ends_with(ext.as_str()))
    }
}
