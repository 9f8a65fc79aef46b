//! Loader configuration.

use std::path::PathBuf;
use std::time::Duration;

use ratefeed_common::constants;

/// Main loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory for the local disk cache. `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of loads running at the same time.
    pub max_concurrent_loads: usize,
    /// Connect timeout for remote locations.
    pub connect_timeout: Duration,
    /// Total timeout for a single remote transfer.
    pub read_timeout: Duration,
    /// How long shutdown waits for in-flight loads.
    pub drain_timeout: Duration,
    /// Buffer size of each per-resource event channel.
    pub channel_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_concurrent_loads: 4,
            connect_timeout: constants::CONNECT_TIMEOUT,
            read_timeout: constants::READ_TIMEOUT,
            drain_timeout: constants::DRAIN_TIMEOUT,
            channel_capacity: 16,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RATEFEED_CACHE_DIR") {
            if !dir.is_empty() {
                config.cache_dir = Some(PathBuf::from(dir));
            }
        }

        if let Ok(n) = std::env::var("RATEFEED_MAX_CONCURRENT_LOADS") {
            if let Ok(n) = n.parse() {
                config.max_concurrent_loads = n;
            }
        }

        if let Ok(ms) = std::env::var("RATEFEED_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.connect_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(ms) = std::env::var("RATEFEED_READ_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.read_timeout = Duration::from_millis(ms);
            }
        }

        config
    }

    /// Set the disk cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_loads == 0 {
            return Err("max_concurrent_loads must be at least 1".to_string());
        }

        if self.channel_capacity == 0 {
            return Err("channel_capacity must be at least 1".to_string());
        }

        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err("Fetch timeouts cannot be zero".to_string());
        }

        Ok(())
    }
}
