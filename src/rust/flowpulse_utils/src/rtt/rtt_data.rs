//! Strongly-typed RTT data.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// RTT value, stored as nanoseconds since this is the unit packet
/// capture timestamps are delivered in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(C)]
pub struct RttData {
    nanoseconds: u64,
}

impl RttData {
    /// Create an RTT value from nanoseconds.
    pub const fn from_nanos(nanoseconds: u64) -> Self {
        Self { nanoseconds }
    }

    /// Create an RTT value from (possibly fractional) milliseconds.
    /// Negative and non-finite inputs become zero.
    pub fn from_millis(milliseconds: f64) -> Self {
        if !milliseconds.is_finite() || milliseconds <= 0.0 {
            return Self::from_nanos(0);
        }
        Self::from_nanos((milliseconds * 1_000_000.0).round() as u64)
    }

    /// Elapsed time between a send and an acknowledgement, both in
    /// nanoseconds on the same clock. Returns `None` when the
    /// acknowledgement predates the send.
    pub fn between(sent_nanos: u64, acked_nanos: u64) -> Option<Self> {
        acked_nanos.checked_sub(sent_nanos).map(Self::from_nanos)
    }

    /// Return the RTT in nanoseconds.
    pub const fn as_nanos(&self) -> u64 {
        self.nanoseconds
    }

    /// Return the RTT in microseconds.
    pub fn as_micros(&self) -> f64 {
        self.nanoseconds as f64 / 1_000.0
    }

    /// Return the RTT in milliseconds.
    pub fn as_millis(&self) -> f64 {
        self.nanoseconds as f64 / 1_000_000.0
    }

    /// Return the RTT in seconds.
    pub fn as_seconds(&self) -> f64 {
        self.nanoseconds as f64 / 1_000_000_000.0
    }
}

impl From<Duration> for RttData {
    fn from(value: Duration) -> Self {
        Self::from_nanos(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<RttData> for Duration {
    fn from(value: RttData) -> Self {
        Duration::from_nanos(value.nanoseconds)
    }
}
