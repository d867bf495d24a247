use crate::classifier::ClassifierConfig;
use crate::flow_tracker::TrackerConfig;
use flowpulse_config::Config;
use std::time::Duration;

/// Everything [`crate::Pipeline::start`] needs, in runtime units.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub interval: Duration,
    pub history_length: usize,
    pub channel_capacity: usize,
    pub idle_sweep_interval: Duration,
    /// Metrics held between two ticks before new ones are refused.
    pub metric_buffer_capacity: usize,
    pub tracker: TrackerConfig,
    pub classifier: ClassifierConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            history_length: 100,
            channel_capacity: 65536,
            idle_sweep_interval: Duration::from_secs(1),
            metric_buffer_capacity: 1 << 20,
            tracker: TrackerConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.pipeline.interval(),
            history_length: config.pipeline.history_length,
            channel_capacity: config.pipeline.channel_capacity,
            idle_sweep_interval: config.pipeline.idle_sweep().max(Duration::from_millis(10)),
            // One tick's worth of a full channel, sixteen times over.
            metric_buffer_capacity: config.pipeline.channel_capacity.saturating_mul(16),
            tracker: TrackerConfig {
                idle_timeout: config.flows.idle_timeout(config.pipeline.history_span()),
                pending_capacity: config.flows.pending_capacity,
            },
            classifier: ClassifierConfig::from(&config.congestion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let from_config = PipelineSettings::from(&Config::default());
        let defaults = PipelineSettings::default();
        assert_eq!(from_config.interval, defaults.interval);
        assert_eq!(from_config.history_length, defaults.history_length);
        assert_eq!(from_config.channel_capacity, defaults.channel_capacity);
        assert_eq!(from_config.idle_sweep_interval, defaults.idle_sweep_interval);
        assert_eq!(from_config.tracker, defaults.tracker);
        assert_eq!(from_config.classifier, defaults.classifier);
    }

    #[test]
    fn idle_timeout_tracks_history_span() {
        let mut config = Config::default();
        config.pipeline.interval_ms = 50;
        config.pipeline.history_length = 600;
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.tracker.idle_timeout, Duration::from_secs(30));

        config.flows.idle_timeout_seconds = Some(5);
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.tracker.idle_timeout, Duration::from_secs(5));
    }
}
