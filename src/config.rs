//! Stream and player configuration.
//!
//! JSON layout (camelCase keys):
//!
//! ```json
//! { "startTimestamp": 0, "endTimestamp": 10000, "frameDuration": 100,
//!   "maxCacheFrameCount": 200, "concurrency": 10, "tickInterval": 100 }
//! ```
//!
//! Config file lookup: CLI `--config` → `FRAMESTREAM_CONFIG` env var → none.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::scheduler::DEFAULT_LIMIT;
use crate::entities::{Timeline, Timestamp};

/// Environment variable naming a JSON config file
pub const CONFIG_ENV: &str = "FRAMESTREAM_CONFIG";

pub const DEFAULT_FRAME_DURATION: u64 = 100;
pub const DEFAULT_MAX_CACHE_FRAME_COUNT: usize = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_frame_duration() -> u64 {
    DEFAULT_FRAME_DURATION
}

fn default_max_cache_frame_count() -> usize {
    DEFAULT_MAX_CACHE_FRAME_COUNT
}

fn default_concurrency() -> usize {
    DEFAULT_LIMIT
}

/// Timeline bounds and buffering limits of one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    pub start_timestamp: Timestamp,
    pub end_timestamp: Timestamp,
    /// Milliseconds per frame slot
    #[serde(default = "default_frame_duration")]
    pub frame_duration: u64,
    /// Resident window size; `>= frame count` disables eviction
    #[serde(default = "default_max_cache_frame_count")]
    pub max_cache_frame_count: usize,
    /// Prefetch tasks running at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl StreamConfig {
    /// Config for `[start, end)` with default buffering limits.
    pub fn new(start_timestamp: Timestamp, end_timestamp: Timestamp) -> Self {
        Self {
            start_timestamp,
            end_timestamp,
            frame_duration: DEFAULT_FRAME_DURATION,
            max_cache_frame_count: DEFAULT_MAX_CACHE_FRAME_COUNT,
            concurrency: DEFAULT_LIMIT,
        }
    }

    pub fn with_frame_duration(mut self, frame_duration: u64) -> Self {
        self.frame_duration = frame_duration;
        self
    }

    pub fn with_max_cache_frame_count(mut self, count: usize) -> Self {
        self.max_cache_frame_count = count;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Build the timeline, validating the rest of the config on the way.
    pub fn timeline(&self) -> Result<Timeline, ConfigError> {
        self.validate()?;
        Timeline::new(self.start_timestamp, self.end_timestamp, self.frame_duration)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cache_frame_count == 0 {
            return Err(ConfigError::Invalid("maxCacheFrameCount must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        Timeline::new(self.start_timestamp, self.end_timestamp, self.frame_duration)
            .map(|_| ())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Stream config plus playback pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    #[serde(flatten)]
    pub stream: StreamConfig,
    /// Timer interval in ms; defaults to the frame duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval: Option<u64>,
}

impl PlayerConfig {
    pub fn new(stream: StreamConfig) -> Self {
        Self {
            stream,
            tick_interval: None,
        }
    }

    pub fn with_tick_interval(mut self, ms: u64) -> Self {
        self.tick_interval = Some(ms);
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval.unwrap_or(self.stream.frame_duration))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        if self.tick_interval == Some(0) {
            return Err(ConfigError::Invalid("tickInterval must be positive".into()));
        }
        Ok(())
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Pick the config file path.
///
/// Priority: CLI argument → `FRAMESTREAM_CONFIG` → None
pub fn config_path(cli: Option<PathBuf>) -> Option<PathBuf> {
    resolve_config_path(cli, std::env::var(CONFIG_ENV).ok())
}

fn resolve_config_path(cli: Option<PathBuf>, env: Option<String>) -> Option<PathBuf> {
    cli.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded config from {}", path.display());
    Ok(serde_json::from_str(&raw)?)
}
