//! Engine tuning knobs.
//!
//! Every value has a default. With the `config` feature enabled the settings can also be
//! read from a TOML file, by default `<config_dir>/rtless/config.toml` (overridable with
//! the `RTLESS_CONFIG` environment variable). Missing keys fall back to their defaults.

use crate::error::{Result, RtlessError};
use crate::remote::DEFAULT_LOCAL_ENCODING;
use std::time::Duration;

#[cfg(feature = "config")]
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct EngineConfig {
    /// Lines between two checkpoints when building the offset map
    pub index_interval: u64,
    /// Tail-follow extends the index every this many lines
    pub tail_chunk_size: u64,
    /// Default grep hit limit; 0 means unlimited
    pub grep_max_results: u64,
    /// Window of the batch aggregator, in milliseconds
    pub batch_interval_ms: u64,
    /// Capacity of each remote line channel
    pub stream_capacity: usize,
    /// Encoding lines are converted into
    pub local_encoding: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_interval: 10_000,
            tail_chunk_size: 1_000,
            grep_max_results: 0,
            batch_interval_ms: 200,
            stream_capacity: 256,
            local_encoding: DEFAULT_LOCAL_ENCODING.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.index_interval == 0 {
            return Err(RtlessError::config("index_interval must be > 0"));
        }
        if self.tail_chunk_size == 0 {
            return Err(RtlessError::config("tail_chunk_size must be > 0"));
        }
        if self.stream_capacity == 0 {
            return Err(RtlessError::config("stream_capacity must be > 0"));
        }
        if self.local_encoding.trim().is_empty() {
            return Err(RtlessError::config("local_encoding must not be empty"));
        }
        Ok(())
    }
}

#[cfg(feature = "config")]
impl EngineConfig {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        std::env::var("RTLESS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("rtless")
                    .join("config.toml")
            })
    }

    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| RtlessError::config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RtlessError::io(format!("reading {}", path.display()), e))?;
        Self::from_toml(&text)
    }

    /// Load from the default location, or fall back to defaults if there is no file
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }
}
