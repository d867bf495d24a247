//! Top-level configuration file for FlowPulse.

use crate::{CongestionConfig, FlowConfig, PipelineConfig, SourceConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// The only configuration schema version this build understands.
pub const CONFIG_VERSION: &str = "1.0";

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

/// Top-level configuration file for FlowPulse.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Version number for the configuration file.
    #[serde(default = "default_version")]
    pub version: String,

    /// Tick cadence and history sizing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Congestion classification thresholds
    #[serde(default)]
    pub congestion: CongestionConfig,

    /// Per-flow state limits
    #[serde(default)]
    pub flows: FlowConfig,

    /// Where packet events come from
    #[serde(default)]
    pub source: SourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            pipeline: PipelineConfig::default(),
            congestion: CongestionConfig::default(),
            flows: FlowConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Config {
    /// Test if a configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim() != CONFIG_VERSION {
            return Err(ConfigError::UnknownVersion(self.version.clone()));
        }
        if self.pipeline.interval_ms == 0 {
            return Err(ConfigError::Invalid("pipeline.interval_ms must be at least 1".into()));
        }
        if self.pipeline.history_length == 0 {
            return Err(ConfigError::Invalid("pipeline.history_length must be at least 1".into()));
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(ConfigError::Invalid("pipeline.channel_capacity must be at least 1".into()));
        }
        if self.pipeline.idle_sweep_seconds == 0 {
            return Err(ConfigError::Invalid("pipeline.idle_sweep_seconds must be at least 1".into()));
        }
        if !(self.congestion.rtt_threshold_ms.is_finite() && self.congestion.rtt_threshold_ms > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "congestion.rtt_threshold_ms must be positive, got {}",
                self.congestion.rtt_threshold_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.congestion.cwnd_threshold_fraction) {
            return Err(ConfigError::Invalid(format!(
                "congestion.cwnd_threshold_fraction must be within 0..=1, got {}",
                self.congestion.cwnd_threshold_fraction
            )));
        }
        if self.flows.idle_timeout_seconds == Some(0) {
            return Err(ConfigError::Invalid("flows.idle_timeout_seconds must be at least 1".into()));
        }
        if self.flows.pending_capacity == 0 {
            return Err(ConfigError::Invalid("flows.pending_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Loads a config file from a string, and validates it.
    pub fn load_from_string(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| {
            error!("Unable to parse TOML configuration");
            error!("Full error: {:?}", e);
            ConfigError::CannotParseToml(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back into TOML, e.g. to write out a starter file.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::CannotSerialize(e.to_string()))
    }
}

/// Errors raised while loading the configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} not found. Create it, or point FLOWPULSE_CONFIG at a configuration file.")]
    ConfigDoesNotExist(String),
    #[error("Unable to read contents of {0}.")]
    CannotReadFile(String),
    #[error("Unable to parse TOML: {0}")]
    CannotParseToml(String),
    #[error("Unable to serialize configuration: {0}")]
    CannotSerialize(String),
    #[error("Configuration file is at version [{0}], but this version of flowpulse only supports version 1.0")]
    UnknownVersion(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod test {
    use super::{Config, ConfigError};

    const EXAMPLE_CONF: &str = include_str!("../flowpulse.example.conf");

    #[test]
    fn load_example() {
        let config = Config::load_from_string(EXAMPLE_CONF).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
        let config = Config::load_from_string("").unwrap();
        assert_eq!(config.pipeline.interval_ms, 100);
        assert_eq!(config.pipeline.history_length, 100);
        assert_eq!(config.congestion.rtt_threshold_ms, 100.0);
        assert_eq!(config.congestion.cwnd_threshold_fraction, 0.7);
        assert_eq!(config.flows.pending_capacity, 1024);
        assert_eq!(config.flows.idle_timeout_seconds, None);
    }

    #[test]
    fn partial_section() {
        let config = Config::load_from_string("[congestion]\nrtt_threshold_ms = 40.0\n").unwrap();
        assert_eq!(config.congestion.rtt_threshold_ms, 40.0);
        assert_eq!(config.congestion.cwnd_threshold_fraction, 0.7);
        assert_eq!(config.pipeline.interval_ms, 100);
    }

    #[test]
    fn idle_timeout_defaults_to_history_span() {
        let config = Config::load_from_string("[pipeline]\ninterval_ms = 250\nhistory_length = 40\n").unwrap();
        let span = config.pipeline.history_span();
        assert_eq!(span, std::time::Duration::from_secs(10));
        assert_eq!(config.flows.idle_timeout(span), span);

        let config = Config::load_from_string("[flows]\nidle_timeout_seconds = 30\n").unwrap();
        let span = config.pipeline.history_span();
        assert_eq!(config.flows.idle_timeout(span), std::time::Duration::from_secs(30));
    }

    #[test]
    fn reject_zero_idle_timeout() {
        let result = Config::load_from_string("[flows]\nidle_timeout_seconds = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reject_bad_fraction() {
        let result = Config::load_from_string("[congestion]\ncwnd_threshold_fraction = 1.5\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reject_zero_interval() {
        let result = Config::load_from_string("[pipeline]\ninterval_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reject_unknown_version() {
        let result = Config::load_from_string("version = \"2.7\"\n");
        assert_eq!(result, Err(ConfigError::UnknownVersion("2.7".to_string())));
    }

    #[test]
    fn reject_garbage() {
        let result = Config::load_from_string("[pipeline\ninterval_ms = ");
        assert!(matches!(result, Err(ConfigError::CannotParseToml(_))));
    }

    #[test]
    fn round_trip_toml() {
        let mut config = Config::default();
        config.source.path = Some("/tmp/capture.jsonl".to_string());
        let raw = config.to_toml().unwrap();
        assert_eq!(Config::load_from_string(&raw).unwrap(), config);
    }
}
