//! Tick cadence and history sizing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Aggregation tick, in milliseconds.
    pub interval_ms: u64,
    /// Entries retained per history series.
    pub history_length: usize,
    /// Capacity of the event channel feeding the flow tracker. Events
    /// arriving while it is full are dropped (and counted).
    pub channel_capacity: usize,
    /// How often idle flows are swept, in seconds.
    pub idle_sweep_seconds: u64,
    /// If set, every history series is written here as JSON on shutdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_export_path: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            history_length: 100,
            channel_capacity: 65536,
            idle_sweep_seconds: 1,
            history_export_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Time covered by a full history series.
    pub fn history_span(&self) -> Duration {
        let ticks = u32::try_from(self.history_length).unwrap_or(u32::MAX);
        self.interval().saturating_mul(ticks)
    }

    pub fn idle_sweep(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_seconds)
    }
}
