//! Pipeline counters. Updated with relaxed atomics from whichever thread
//! owns the event, read by anyone.

use crate::flow_tracker::TrackerCounters;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub events_submitted: AtomicU64,
    pub events_dropped: AtomicU64,
    pub metrics_dropped: AtomicU64,
    pub ticks: AtomicU64,
    pub events_observed: AtomicU64,
    pub flows_active: AtomicU64,
    pub flows_expired: AtomicU64,
    pub rtt_samples: AtomicU64,
    pub negative_rtt_discarded: AtomicU64,
    pub pending_evicted: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub events_submitted: u64,
    pub events_dropped: u64,
    pub metrics_dropped: u64,
    pub ticks: u64,
    pub events_observed: u64,
    pub flows_active: u64,
    pub flows_expired: u64,
    pub rtt_samples: u64,
    pub negative_rtt_discarded: u64,
    pub pending_evicted: u64,
}

impl PipelineStats {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Publish the tracker's totals. Only the ingestion actor calls this.
    pub(crate) fn sync_tracker(&self, counters: &TrackerCounters, flows_active: usize) {
        self.events_observed.store(counters.events, Ordering::Relaxed);
        self.flows_active.store(flows_active as u64, Ordering::Relaxed);
        self.flows_expired.store(counters.flows_expired, Ordering::Relaxed);
        self.rtt_samples.store(counters.rtt_samples, Ordering::Relaxed);
        self.negative_rtt_discarded
            .store(counters.negative_rtt_discarded, Ordering::Relaxed);
        self.pending_evicted.store(counters.pending_evicted, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_submitted: self.events_submitted.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            metrics_dropped: self.metrics_dropped.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            events_observed: self.events_observed.load(Ordering::Relaxed),
            flows_active: self.flows_active.load(Ordering::Relaxed),
            flows_expired: self.flows_expired.load(Ordering::Relaxed),
            rtt_samples: self.rtt_samples.load(Ordering::Relaxed),
            negative_rtt_discarded: self.negative_rtt_discarded.load(Ordering::Relaxed),
            pending_evicted: self.pending_evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_and_snapshot() {
        let stats = PipelineStats::default();
        PipelineStats::add(&stats.events_submitted, 3);
        stats.sync_tracker(
            &TrackerCounters {
                events: 3,
                rtt_samples: 1,
                ..Default::default()
            },
            2,
        );
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_submitted, 3);
        assert_eq!(snapshot.events_observed, 3);
        assert_eq!(snapshot.rtt_samples, 1);
        assert_eq!(snapshot.flows_active, 2);
        assert_eq!(snapshot.events_dropped, 0);
    }
}
