//! Configuration management for the pipeline
//!
//! Settings live in a TOML file with the same section layout the operators
//! already know (`[datafinder]`, `[dataretrieval]`, `[reduction]`,
//! `[logging]`). Every field has a default so a missing file or a partial
//! file is fine; service endpoints can additionally be overridden from the
//! environment for test deployments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data discovery configuration
    pub datafinder: DatafinderConfig,

    /// Download configuration
    pub dataretrieval: DataRetrievalConfig,

    /// Reduction engine configuration
    pub reduction: ReductionConfig,

    /// Remote service endpoints
    pub services: ServicesConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Data discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatafinderConfig {
    /// Minimum science frames; always effectively at least 1
    pub min_objects: usize,

    /// Minimum flat frames; 0 makes flats optional
    pub min_flats: usize,

    /// Minimum long darks; 0 makes them optional
    pub min_longdarks: usize,

    /// Minimum short darks; 0 makes them optional
    pub min_shortdarks: usize,

    /// Catalog query attempts per role
    pub max_tries: u32,
}

impl Default for DatafinderConfig {
    fn default() -> Self {
        Self {
            min_objects: 1,
            min_flats: 1,
            min_longdarks: 1,
            min_shortdarks: 0,
            max_tries: 3,
        }
    }
}

impl DatafinderConfig {
    /// Minimum for the object role, which can never be optional
    pub fn effective_min_objects(&self) -> usize {
        self.min_objects.max(1)
    }
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataRetrievalConfig {
    /// Directory raw frames are written to, relative to the working directory
    pub raw_data_path: PathBuf,

    /// Scratch directory for in-flight downloads, under `raw_data_path`
    pub temp_downloads_path: PathBuf,

    /// Archive requests per second for file and header fetches
    pub requests_per_second: u32,

    /// Per-file download timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for DataRetrievalConfig {
    fn default() -> Self {
        Self {
            raw_data_path: PathBuf::from("rawData"),
            temp_downloads_path: PathBuf::from(".temp-downloads"),
            requests_per_second: 4,
            request_timeout_secs: 600,
        }
    }
}

impl DataRetrievalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Reduction engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Reduction engine executable
    pub engine: PathBuf,

    /// Log file the engine is asked to write
    pub logfile: PathBuf,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            engine: PathBuf::from("reduce"),
            logfile: PathBuf::from("reduce.log"),
        }
    }
}

/// Remote service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Base URL of the catalog TAP service
    pub tap_url: String,

    /// Base URL of the archive data service (file and header fetches)
    pub data_url: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            tap_url: String::from("https://ws.cadc-ccda.hia-iha.nrc-cnrc.gc.ca/argus/"),
            data_url: String::from("https://ws.cadc-ccda.hia-iha.nrc-cnrc.gc.ca/data/pub/GEM/"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration, merging an optional TOML file over the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides for service endpoints
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NIRIPIPE_TAP_URL") {
            self.services.tap_url = url;
        }
        if let Ok(url) = std::env::var("NIRIPIPE_DATA_URL") {
            self.services.data_url = url;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.datafinder.max_tries == 0 {
            anyhow::bail!("datafinder.max_tries must be at least 1");
        }
        if self.dataretrieval.requests_per_second == 0 {
            anyhow::bail!("dataretrieval.requests_per_second must be at least 1");
        }
        if self.services.tap_url.is_empty() || self.services.data_url.is_empty() {
            anyhow::bail!("service endpoints must not be empty");
        }
        Ok(())
    }
}
