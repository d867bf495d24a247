//! Congestion scoring.
//!
//! A tick is scored from two signals: how far the mean RTT sits above the
//! threshold, and how far the mean advertised window has shrunk below the
//! largest window seen so far. Either signal alone is enough to raise the
//! congestion flag.

use crate::aggregator::AggregateSnapshot;
use flowpulse_utils::rtt::RttData;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    pub rtt_threshold: RttData,
    /// Window below `fraction * max_observed_window` counts as congested.
    pub cwnd_threshold_fraction: f64,
    /// Consecutive ticks the raw flag must hold before the reported flag
    /// changes. Zero reports the raw flag directly.
    pub debounce_ticks: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rtt_threshold: RttData::from_millis(100.0),
            cwnd_threshold_fraction: 0.7,
            debounce_ticks: 0,
        }
    }
}

impl From<&flowpulse_config::CongestionConfig> for ClassifierConfig {
    fn from(value: &flowpulse_config::CongestionConfig) -> Self {
        Self {
            rtt_threshold: RttData::from_millis(value.rtt_threshold_ms),
            cwnd_threshold_fraction: value.cwnd_threshold_fraction,
            debounce_ticks: value.debounce_ticks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CongestionVerdict {
    pub tick_time: Duration,
    /// Combined score in `[0, 1]`.
    pub score: f64,
    pub is_congested: bool,
    pub rtt_excess: f64,
    pub window_deficit: f64,
    pub max_observed_window: f64,
}

/// Score a single snapshot against an already-updated window maximum.
///
/// Absent averages contribute nothing: no RTT sample means no RTT excess,
/// and no window sample (or no maximum yet) means no window deficit.
pub fn classify(
    snapshot: &AggregateSnapshot,
    rtt_threshold: RttData,
    cwnd_threshold_fraction: f64,
    max_observed_window: f64,
) -> CongestionVerdict {
    let threshold_ms = rtt_threshold.as_millis();

    let (rtt_excess, rtt_congested) = match snapshot.avg_rtt {
        Some(rtt) if threshold_ms > 0.0 => {
            let rtt_ms = rtt.as_millis();
            (
                ((rtt_ms - threshold_ms) / threshold_ms).max(0.0),
                rtt_ms > threshold_ms,
            )
        }
        _ => (0.0, false),
    };

    let (window_deficit, window_congested) = match snapshot.avg_window {
        Some(window) if max_observed_window > 0.0 => (
            (1.0 - window / max_observed_window).max(0.0),
            window < cwnd_threshold_fraction * max_observed_window,
        ),
        _ => (0.0, false),
    };

    CongestionVerdict {
        tick_time: snapshot.tick_time,
        score: ((rtt_excess + window_deficit) / 2.0).clamp(0.0, 1.0),
        is_congested: rtt_congested || window_congested,
        rtt_excess,
        window_deficit,
        max_observed_window,
    }
}

/// Carries state between ticks: the running window maximum and the
/// debounce counter.
#[derive(Debug)]
pub struct CongestionClassifier {
    config: ClassifierConfig,
    max_observed_window: f64,
    reported: bool,
    streak: u32,
}

impl CongestionClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            max_observed_window: 0.0,
            reported: false,
            streak: 0,
        }
    }

    pub fn max_observed_window(&self) -> f64 {
        self.max_observed_window
    }

    /// Classify one tick. The window maximum is raised first, so a tick that
    /// sets a new maximum never shows a deficit against itself.
    pub fn classify(&mut self, snapshot: &AggregateSnapshot) -> CongestionVerdict {
        if let Some(window) = snapshot.avg_window {
            if window > self.max_observed_window {
                self.max_observed_window = window;
            }
        }

        let mut verdict = classify(
            snapshot,
            self.config.rtt_threshold,
            self.config.cwnd_threshold_fraction,
            self.max_observed_window,
        );
        verdict.is_congested = self.debounce(verdict.is_congested);
        verdict
    }

    fn debounce(&mut self, raw: bool) -> bool {
        if self.config.debounce_ticks == 0 {
            self.reported = raw;
            return raw;
        }
        if raw == self.reported {
            self.streak = 0;
            return raw;
        }
        self.streak += 1;
        if self.streak >= self.config.debounce_ticks {
            debug!("Congestion flag now {raw} after {} ticks", self.streak);
            self.reported = raw;
            self.streak = 0;
        }
        self.reported
    }
}
