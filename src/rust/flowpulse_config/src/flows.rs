//! Per-flow state limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    /// Flows without events for this long are forgotten. When unset, the
    /// span of the displayed history (`history_length` ticks of
    /// `interval_ms`) is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_seconds: Option<u64>,
    /// Maximum outstanding (unacknowledged) segments remembered per flow.
    pub pending_capacity: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: None,
            pending_capacity: 1024,
        }
    }
}

impl FlowConfig {
    /// The configured idle timeout, or `history_span` if none was given.
    pub fn idle_timeout(&self, history_span: Duration) -> Duration {
        match self.idle_timeout_seconds {
            Some(seconds) => Duration::from_secs(seconds),
            None => history_span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FlowConfig;
    use std::time::Duration;

    #[test]
    fn idle_timeout_follows_history_span_when_unset() {
        let config = FlowConfig::default();
        assert_eq!(
            config.idle_timeout(Duration::from_secs(25)),
            Duration::from_secs(25)
        );
        let config = FlowConfig {
            idle_timeout_seconds: Some(3),
            ..Default::default()
        };
        assert_eq!(
            config.idle_timeout(Duration::from_secs(25)),
            Duration::from_secs(3)
        );
    }
}
