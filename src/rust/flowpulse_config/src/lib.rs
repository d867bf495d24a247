//! Manages the `/etc/flowpulse.conf` file.
//!
//! The file is TOML. Every section is optional; anything not specified
//! falls back to the defaults documented on each section type.

mod congestion;
mod flows;
mod pipeline;
mod source;
mod top_config;

pub use congestion::CongestionConfig;
pub use flows::FlowConfig;
pub use pipeline::PipelineConfig;
pub use source::SourceConfig;
pub use top_config::{Config, ConfigError, CONFIG_VERSION};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flowpulse.conf";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "FLOWPULSE_CONFIG";

static CONFIG: Lazy<Mutex<Option<Arc<Config>>>> = Lazy::new(|| Mutex::new(None));

/// Where the configuration file is expected to be.
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// Load the configuration file, caching it for subsequent calls.
pub fn load_config() -> Result<Arc<Config>, ConfigError> {
    let mut lock = CONFIG.lock();
    if let Some(config) = lock.as_ref() {
        return Ok(config.clone());
    }
    let path = config_path();
    debug!("Loading configuration from {}", path.display());
    let config = Arc::new(load_from_path(&path)?);
    info!("Configuration loaded from {}", path.display());
    *lock = Some(config.clone());
    Ok(config)
}

/// Load and validate a configuration file from an explicit path,
/// without touching the cache.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigDoesNotExist(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| {
        error!("Unable to read contents of {}: {e:?}", path.display());
        ConfigError::CannotReadFile(path.display().to_string())
    })?;
    Config::load_from_string(&raw)
}
