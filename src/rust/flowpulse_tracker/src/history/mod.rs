//! Bounded per-metric history, read by whatever draws the charts.
//!
//! Each series has its own lock, held only long enough to push one point
//! or clone the series, so a reader always sees a whole series and never
//! waits on the tick actor for more than a copy.

mod ring_buffer;

pub use ring_buffer::RingBuffer;

use crate::aggregator::AggregateSnapshot;
use crate::classifier::CongestionVerdict;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt::Display;
use std::time::Duration;

/// The series kept by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    /// Mean advertised window, bytes.
    Window,
    /// Mean RTT, milliseconds.
    Rtt,
    /// Bytes per second.
    Throughput,
    /// Congestion score, with the congestion flag.
    Congestion,
}

impl MetricName {
    pub const ALL: [MetricName; 4] = [
        MetricName::Window,
        MetricName::Rtt,
        MetricName::Throughput,
        MetricName::Congestion,
    ];

    fn index(self) -> usize {
        match self {
            MetricName::Window => 0,
            MetricName::Rtt => 1,
            MetricName::Throughput => 2,
            MetricName::Congestion => 3,
        }
    }
}

impl Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetricName::Window => "window",
            MetricName::Rtt => "rtt",
            MetricName::Throughput => "throughput",
            MetricName::Congestion => "congestion",
        };
        write!(f, "{name}")
    }
}

/// One point in a series. `value` is `None` for ticks with no data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    /// Seconds since the pipeline started.
    pub tick_secs: f64,
    pub value: Option<f64>,
    /// Only set on the congestion series.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<bool>,
}

impl HistoryPoint {
    pub fn new(tick_time: Duration, value: Option<f64>) -> Self {
        Self {
            tick_secs: tick_time.as_secs_f64(),
            value,
            flag: None,
        }
    }

    pub fn flagged(tick_time: Duration, value: f64, flag: bool) -> Self {
        Self {
            tick_secs: tick_time.as_secs_f64(),
            value: Some(value),
            flag: Some(flag),
        }
    }
}

/// Everything in the store at one moment, ready for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryExport {
    pub history_length: usize,
    pub window: Vec<HistoryPoint>,
    pub rtt: Vec<HistoryPoint>,
    pub throughput: Vec<HistoryPoint>,
    pub congestion: Vec<HistoryPoint>,
    /// Tick times (seconds) at which congestion began.
    pub congestion_events: Vec<f64>,
}

#[derive(Debug)]
pub struct HistoryStore {
    history_length: usize,
    series: [RwLock<RingBuffer<HistoryPoint>>; 4],
    congestion_events: RwLock<RingBuffer<f64>>,
    was_congested: Mutex<bool>,
}

impl HistoryStore {
    pub fn new(history_length: usize) -> Self {
        Self {
            history_length,
            series: std::array::from_fn(|_| RwLock::new(RingBuffer::new(history_length))),
            congestion_events: RwLock::new(RingBuffer::new(history_length)),
            was_congested: Mutex::new(false),
        }
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Append a point, evicting the oldest one beyond the history length.
    pub fn append(&self, metric: MetricName, point: HistoryPoint) {
        self.series[metric.index()].write().add(point);
    }

    /// Copy of a series, oldest first.
    pub fn snapshot(&self, metric: MetricName) -> Vec<HistoryPoint> {
        self.series[metric.index()].read().to_vec()
    }

    pub fn latest(&self, metric: MetricName) -> Option<HistoryPoint> {
        self.series[metric.index()].read().latest().copied()
    }

    pub fn len(&self, metric: MetricName) -> usize {
        self.series[metric.index()].read().count()
    }

    pub fn is_empty(&self) -> bool {
        MetricName::ALL.iter().all(|m| self.len(*m) == 0)
    }

    /// Record the result of one tick in every series.
    pub fn record(&self, snapshot: &AggregateSnapshot, verdict: &CongestionVerdict) {
        let tick = snapshot.tick_time;
        self.append(MetricName::Window, HistoryPoint::new(tick, snapshot.avg_window));
        self.append(
            MetricName::Rtt,
            HistoryPoint::new(tick, snapshot.avg_rtt.map(|r| r.as_millis())),
        );
        self.append(
            MetricName::Throughput,
            HistoryPoint::new(tick, Some(snapshot.throughput_bytes_per_sec)),
        );
        self.append(
            MetricName::Congestion,
            HistoryPoint::flagged(tick, verdict.score, verdict.is_congested),
        );

        let mut was_congested = self.was_congested.lock();
        if verdict.is_congested && !*was_congested {
            self.congestion_events.write().add(tick.as_secs_f64());
        }
        *was_congested = verdict.is_congested;
    }

    /// Tick times (seconds) at which the flag went from clear to congested.
    pub fn congestion_events(&self) -> Vec<f64> {
        self.congestion_events.read().to_vec()
    }

    pub fn export(&self) -> HistoryExport {
        HistoryExport {
            history_length: self.history_length,
            window: self.snapshot(MetricName::Window),
            rtt: self.snapshot(MetricName::Rtt),
            throughput: self.snapshot(MetricName::Throughput),
            congestion: self.snapshot(MetricName::Congestion),
            congestion_events: self.congestion_events(),
        }
    }
}
