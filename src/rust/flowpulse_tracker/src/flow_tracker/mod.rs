//! Per-flow state, and extraction of instantaneous metrics from packet
//! events.
//!
//! Each direction of a connection is its own flow. A data-carrying
//! segment is remembered as pending in its own flow; an acknowledgement
//! travelling the other way that names the same sequence number closes
//! the pair and yields an RTT sample.

mod pending;

use crate::event::{FlowKey, PacketEvent};
use flowpulse_utils::rtt::RttData;
use fxhash::FxHashMap;
use pending::PendingRequests;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

/// Limits applied to every flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Flows with no events for this long are purged.
    pub idle_timeout: Duration,
    /// Maximum outstanding segments remembered per flow.
    pub pending_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            pending_capacity: 1024,
        }
    }
}

/// What one packet event told us.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InstantaneousMetric {
    pub key: FlowKey,
    pub timestamp: u64,
    /// Present only when this event acknowledged a pending segment.
    pub rtt: Option<RttData>,
    /// Advertised window in bytes, when the event carried one.
    pub window_size: Option<u64>,
    pub bytes: u64,
}

#[derive(Debug)]
struct FlowState {
    first_seen: u64,
    last_seen: u64,
    last_seq: Option<u32>,
    /// Sequence number of the last segment that carried payload. Pure
    /// acks do not move it, so data following an ack with the same
    /// sequence number still counts as new.
    last_data_seq: Option<u32>,
    last_ack_seq: Option<u32>,
    pending: PendingRequests,
    bytes: u64,
    packets: u64,
    rtt_samples: u64,
    last_rtt: Option<RttData>,
}

impl FlowState {
    fn new(timestamp: u64, pending_capacity: usize) -> Self {
        Self {
            first_seen: timestamp,
            last_seen: timestamp,
            last_seq: None,
            last_data_seq: None,
            last_ack_seq: None,
            pending: PendingRequests::new(pending_capacity),
            bytes: 0,
            packets: 0,
            rtt_samples: 0,
            last_rtt: None,
        }
    }

    fn is_idle(&self, now: u64, idle_timeout_nanos: u64) -> bool {
        now.saturating_sub(self.last_seen) > idle_timeout_nanos
    }
}

/// Read-only view of one flow, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    pub key: FlowKey,
    pub first_seen: u64,
    pub last_seen: u64,
    pub bytes: u64,
    pub packets: u64,
    pub last_seq: Option<u32>,
    pub last_ack_seq: Option<u32>,
    pub pending: usize,
    pub rtt_samples: u64,
    pub last_rtt: Option<RttData>,
}

/// Running totals kept by the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerCounters {
    pub events: u64,
    pub flows_created: u64,
    pub flows_expired: u64,
    pub rtt_samples: u64,
    pub negative_rtt_discarded: u64,
    pub pending_evicted: u64,
}

/// Owns every `FlowState`. Not shared: the ingestion actor is its only
/// user.
#[derive(Debug)]
pub struct FlowTracker {
    config: TrackerConfig,
    flows: FxHashMap<FlowKey, FlowState>,
    latest_timestamp: u64,
    counters: TrackerCounters,
}

impl FlowTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            flows: FxHashMap::default(),
            latest_timestamp: 0,
            counters: TrackerCounters::default(),
        }
    }

    fn idle_timeout_nanos(&self) -> u64 {
        u64::try_from(self.config.idle_timeout.as_nanos()).unwrap_or(u64::MAX)
    }

    /// Feed one event through the tracker.
    ///
    /// Every event yields a metric so throughput and window accounting
    /// never miss a packet; `rtt` is only filled in when the event's
    /// acknowledgement closes a pending segment of the reverse flow.
    pub fn observe(&mut self, event: &PacketEvent) -> InstantaneousMetric {
        self.counters.events += 1;
        self.latest_timestamp = self.latest_timestamp.max(event.timestamp);
        let idle_nanos = self.idle_timeout_nanos();
        let capacity = self.config.pending_capacity;

        // Our own direction: create, or replace if it went stale.
        let stale = self
            .flows
            .get(&event.key)
            .is_some_and(|f| f.is_idle(event.timestamp, idle_nanos));
        if stale {
            debug!("Flow {} idle beyond timeout, starting afresh", event.key);
            self.flows.remove(&event.key);
            self.counters.flows_expired += 1;
        }
        let flow = self.flows.entry(event.key).or_insert_with(|| {
            self.counters.flows_created += 1;
            FlowState::new(event.timestamp, capacity)
        });
        flow.last_seen = flow.last_seen.max(event.timestamp);
        flow.packets += 1;
        flow.bytes += u64::from(event.payload_len);

        if let Some(seq) = event.seq {
            if event.payload_len > 0 {
                let unseen = flow.last_data_seq != Some(seq) && !flow.pending.contains(seq);
                if unseen {
                    self.counters.pending_evicted +=
                        flow.pending.insert(seq, event.timestamp) as u64;
                }
                flow.last_data_seq = Some(seq);
            }
            flow.last_seq = Some(seq);
        }
        if let Some(ack) = event.ack_seq {
            flow.last_ack_seq = Some(ack);
        }

        let rtt = event.ack_seq.and_then(|ack| self.match_ack(event, ack, idle_nanos));

        InstantaneousMetric {
            key: event.key,
            timestamp: event.timestamp,
            rtt,
            window_size: event.window_bytes(),
            bytes: u64::from(event.payload_len),
        }
    }

    fn match_ack(&mut self, event: &PacketEvent, ack: u32, idle_nanos: u64) -> Option<RttData> {
        let reverse_key = event.key.reversed();
        if reverse_key == event.key {
            return None;
        }
        let reverse_stale = self
            .flows
            .get(&reverse_key)
            .is_some_and(|f| f.is_idle(event.timestamp, idle_nanos));
        if reverse_stale {
            debug!("Flow {} idle beyond timeout, purging", reverse_key);
            self.flows.remove(&reverse_key);
            self.counters.flows_expired += 1;
            return None;
        }

        let sent_at = self.flows.get_mut(&reverse_key)?.pending.take(ack)?;
        let Some(rtt) = RttData::between(sent_at, event.timestamp) else {
            trace!(
                "Discarding negative RTT on {} (sent {} acked {})",
                reverse_key,
                sent_at,
                event.timestamp
            );
            self.counters.negative_rtt_discarded += 1;
            return None;
        };

        self.counters.rtt_samples += 1;
        if let Some(flow) = self.flows.get_mut(&reverse_key) {
            flow.rtt_samples += 1;
            flow.last_rtt = Some(rtt);
        }
        Some(rtt)
    }

    /// Purge flows idle relative to `now` (nanoseconds, capture clock).
    /// Returns the number purged.
    pub fn expire_idle_at(&mut self, now: u64) -> usize {
        let idle_nanos = self.idle_timeout_nanos();
        let before = self.flows.len();
        self.flows.retain(|_, f| !f.is_idle(now, idle_nanos));
        let expired = before - self.flows.len();
        self.counters.flows_expired += expired as u64;
        expired
    }

    /// Purge flows idle relative to the newest event seen so far. Using the
    /// capture clock keeps replayed captures consistent.
    pub fn expire_idle(&mut self) -> usize {
        self.expire_idle_at(self.latest_timestamp)
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn counters(&self) -> TrackerCounters {
        self.counters
    }

    /// Summaries of every tracked flow, busiest first.
    pub fn flow_summaries(&self) -> Vec<FlowSummary> {
        let mut result: Vec<FlowSummary> = self
            .flows
            .iter()
            .map(|(key, flow)| FlowSummary {
                key: *key,
                first_seen: flow.first_seen,
                last_seen: flow.last_seen,
                bytes: flow.bytes,
                packets: flow.packets,
                last_seq: flow.last_seq,
                last_ack_seq: flow.last_ack_seq,
                pending: flow.pending.len(),
                rtt_samples: flow.rtt_samples,
                last_rtt: flow.last_rtt,
            })
            .collect();
        result.sort_by(|a, b| b.bytes.cmp(&a.bytes).then(a.key.cmp(&b.key)));
        result
    }
}
