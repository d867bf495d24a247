//! Congestion classification thresholds.
//!
//! A tick is considered congested when the mean RTT exceeds
//! `rtt_threshold_ms`, or when the mean advertised window falls below
//! `cwnd_threshold_fraction` of the largest window seen so far.

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct CongestionConfig {
    /// RTT above which a tick counts as congested, in milliseconds.
    pub rtt_threshold_ms: f64,
    /// Fraction (0-1) of the maximum observed window below which a tick
    /// counts as congested.
    pub cwnd_threshold_fraction: f64,
    /// Number of consecutive ticks the raw flag must hold before the
    /// reported flag changes. Zero reports every tick as-is.
    pub debounce_ticks: u32,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            rtt_threshold_ms: 100.0,
            cwnd_threshold_fraction: 0.7,
            debounce_ticks: 0,
        }
    }
}
