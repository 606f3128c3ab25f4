//! Application configuration for `VrMapApp`.

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, MapConfig};

/// Default number of runtime worker threads for the producer side.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Top-level configuration passed to `VrMapApp::start()`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Map configuration (also sent to the producer in `init`).
    pub map: MapConfig,

    /// File the map configuration was read from, if any.
    pub source: Option<PathBuf>,

    /// Worker threads for an app-owned runtime.
    pub worker_threads: usize,
}

impl AppConfig {
    pub fn new(map: MapConfig) -> Self {
        Self {
            map,
            source: None,
            worker_threads: DEFAULT_WORKER_THREADS,
        }
    }

    /// Load the map configuration from an INI file.
    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        let map = MapConfig::load(path)?;
        Ok(Self {
            source: Some(path.to_path_buf()),
            ..Self::new(map)
        })
    }

    /// Override the per-tick addition cap.
    pub fn with_max_feature_add_per_tick(mut self, limit: usize) -> Self {
        self.map.max_feature_add_per_tick = limit.max(1);
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(MapConfig::default())
    }
}
