//! Turns the instantaneous metrics collected during one tick into a
//! single aggregate snapshot.

use crate::flow_tracker::InstantaneousMetric;
use flowpulse_utils::rtt::RttData;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Elapsed time is never taken as less than this, so rates stay finite.
const MIN_ELAPSED: Duration = Duration::from_micros(1);

/// Handoff between the ingestion actor (producer) and the tick actor
/// (consumer). The producer appends, the consumer swaps the whole vector
/// out; neither side iterates a vector the other is mutating.
#[derive(Debug)]
pub struct MetricBuffer {
    metrics: Mutex<Vec<InstantaneousMetric>>,
    max_len: usize,
}

impl MetricBuffer {
    /// `max_len` bounds the metrics held between two ticks. Anything beyond
    /// it is refused and reported back to the caller.
    pub fn new(max_len: usize) -> Self {
        Self {
            metrics: Mutex::new(Vec::new()),
            max_len: max_len.max(1),
        }
    }

    /// Append a batch. Returns how many metrics did not fit.
    pub fn extend(&self, batch: &mut Vec<InstantaneousMetric>) -> usize {
        let mut lock = self.metrics.lock();
        let room = self.max_len.saturating_sub(lock.len());
        let refused = batch.len().saturating_sub(room);
        batch.truncate(room.min(batch.len()));
        lock.append(batch);
        refused
    }

    pub fn push(&self, metric: InstantaneousMetric) -> bool {
        let mut lock = self.metrics.lock();
        if lock.len() >= self.max_len {
            return false;
        }
        lock.push(metric);
        true
    }

    /// Swap the buffer out, leaving an empty one behind.
    pub fn take(&self) -> Vec<InstantaneousMetric> {
        std::mem::take(&mut *self.metrics.lock())
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate of one tick. Never modified once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    /// Time of the tick, relative to the start of the pipeline.
    pub tick_time: Duration,
    /// Actual time since the previous tick.
    pub elapsed: Duration,
    pub throughput_bytes_per_sec: f64,
    pub packets_per_sec: f64,
    /// Mean of the RTT samples seen this tick; `None` when there were none.
    pub avg_rtt: Option<RttData>,
    /// Mean advertised window (bytes) seen this tick; `None` when no event
    /// carried one.
    pub avg_window: Option<f64>,
    pub sample_count: usize,
    pub rtt_sample_count: usize,
}

impl AggregateSnapshot {
    /// Build a snapshot from one tick's worth of metrics.
    pub fn from_metrics(
        metrics: &[InstantaneousMetric],
        tick_time: Duration,
        elapsed: Duration,
    ) -> Self {
        let seconds = elapsed.max(MIN_ELAPSED).as_secs_f64();
        let bytes: u64 = metrics.iter().map(|m| m.bytes).sum();

        let (rtt_sum, rtt_count) = metrics
            .iter()
            .filter_map(|m| m.rtt)
            .fold((0u128, 0usize), |(sum, n), rtt| (sum + u128::from(rtt.as_nanos()), n + 1));
        let avg_rtt = if rtt_count > 0 {
            let mean = rtt_sum / rtt_count as u128;
            Some(RttData::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)))
        } else {
            None
        };

        let (window_sum, window_count) = metrics
            .iter()
            .filter_map(|m| m.window_size)
            .fold((0f64, 0usize), |(sum, n), w| (sum + w as f64, n + 1));
        let avg_window = if window_count > 0 {
            Some(window_sum / window_count as f64)
        } else {
            None
        };

        Self {
            tick_time,
            elapsed,
            throughput_bytes_per_sec: bytes as f64 / seconds,
            packets_per_sec: metrics.len() as f64 / seconds,
            avg_rtt,
            avg_window,
            sample_count: metrics.len(),
            rtt_sample_count: rtt_count,
        }
    }

    /// True if nothing at all was observed during the tick.
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

/// Keeps the tick clock. Each call to [`MetricAggregator::tick_at`] covers
/// the time since the previous call, however long that actually was.
#[derive(Debug)]
pub struct MetricAggregator {
    started: Instant,
    last_tick: Instant,
    ticks: u64,
}

impl MetricAggregator {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            last_tick: started,
            ticks: 0,
        }
    }

    /// Drain `buffer` and aggregate it as of `now`.
    pub fn tick_at(&mut self, buffer: &MetricBuffer, now: Instant) -> AggregateSnapshot {
        let metrics = buffer.take();
        self.aggregate(&metrics, now)
    }

    /// Aggregate an already-drained batch as of `now`.
    pub fn aggregate(&mut self, metrics: &[InstantaneousMetric], now: Instant) -> AggregateSnapshot {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let tick_time = now.saturating_duration_since(self.started);
        self.last_tick = now;
        self.ticks += 1;
        AggregateSnapshot::from_metrics(metrics, tick_time, elapsed)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
