//! The running pipeline: an ingestion actor that owns the flow tracker,
//! and a tick actor that owns the aggregator and classifier.
//!
//! Producers hand events to the ingestion actor through a bounded channel
//! and never wait; if the channel is full the event is dropped and
//! counted. The ingestion actor turns each event into a metric and pushes
//! it into a shared [`MetricBuffer`]. On every tick the tick actor swaps
//! that buffer out, aggregates it, classifies the result and records it in
//! the [`HistoryStore`].

use crate::aggregator::{AggregateSnapshot, MetricAggregator, MetricBuffer};
use crate::classifier::{CongestionClassifier, CongestionVerdict};
use crate::event::PacketEvent;
use crate::flow_tracker::{FlowSummary, FlowTracker, InstantaneousMetric, TrackerCounters};
use crate::history::HistoryStore;
use crate::settings::PipelineSettings;
use crate::stats::{PipelineStats, StatsSnapshot};
use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Events handled per wakeup before the actor looks at its command
/// channel again.
const MAX_BATCH: usize = 4096;

/// How long a diagnostics request waits for the ingestion actor.
const REPLY_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug)]
enum IngestCommand {
    ExpireIdleFlows,
    FlowSummaries(Sender<Vec<FlowSummary>>),
    Shutdown,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unable to spawn the {0} thread: {1}")]
    ThreadSpawn(&'static str, String),
    #[error("The {0} thread panicked")]
    ThreadPanicked(&'static str),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Event channel full, event dropped")]
    Full,
    #[error("Pipeline is stopped")]
    Closed,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickResult {
    pub snapshot: AggregateSnapshot,
    pub verdict: CongestionVerdict,
}

/// Returned by [`Pipeline::stop`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub ticks: u64,
    pub stats: StatsSnapshot,
    pub tracker: TrackerCounters,
    pub last_tick: Option<TickResult>,
}

/// Cheap to clone; hand one to every producer.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<PacketEvent>,
    /// Held for reading across each send, and for writing when the pipeline
    /// closes, so no event can land in the channel after the final drain.
    open: Arc<RwLock<bool>>,
    stats: Arc<PipelineStats>,
}

impl EventSender {
    /// Offer an event to the pipeline without blocking.
    pub fn submit(&self, event: PacketEvent) -> Result<(), SubmitError> {
        let open = self.open.read();
        if !*open {
            return Err(SubmitError::Closed);
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                PipelineStats::add(&self.stats.events_submitted, 1);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                PipelineStats::add(&self.stats.events_dropped, 1);
                Err(SubmitError::Full)
            }
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::Closed),
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open.read()
    }
}

/// Handle to a running pipeline. Dropping it stops the pipeline.
#[derive(Debug)]
pub struct Pipeline {
    sender: EventSender,
    cmd_tx: Sender<IngestCommand>,
    stop_tx: Sender<()>,
    ingest: Option<JoinHandle<TrackerCounters>>,
    ticker: Option<JoinHandle<u64>>,
    history: Arc<HistoryStore>,
    latest: Arc<RwLock<Option<TickResult>>>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Spawn both actors and return a handle.
    pub fn start(settings: PipelineSettings) -> Result<Self, PipelineError> {
        let started = Instant::now();
        let (event_tx, event_rx) = crossbeam_channel::bounded(settings.channel_capacity.max(1));
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(16);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        let buffer = Arc::new(MetricBuffer::new(settings.metric_buffer_capacity));
        let history = Arc::new(HistoryStore::new(settings.history_length));
        let latest = Arc::new(RwLock::new(None));
        let stats = Arc::new(PipelineStats::default());

        let ingest = {
            let buffer = buffer.clone();
            let stats = stats.clone();
            let tracker = FlowTracker::new(settings.tracker);
            std::thread::Builder::new()
                .name("FlowIngest".to_string())
                .spawn(move || ingest_actor(tracker, event_rx, cmd_rx, buffer, stats))
                .map_err(|e| PipelineError::ThreadSpawn("ingestion", e.to_string()))?
        };

        let ticker = {
            let actor = TickActor {
                aggregator: MetricAggregator::new(started),
                classifier: CongestionClassifier::new(settings.classifier),
                buffer,
                history: history.clone(),
                latest: latest.clone(),
                stats: stats.clone(),
                cmd_tx: cmd_tx.clone(),
                idle_sweep_interval: settings.idle_sweep_interval,
                last_sweep: started,
            };
            let interval = settings.interval;
            std::thread::Builder::new()
                .name("FlowTick".to_string())
                .spawn(move || actor.run(interval, stop_rx))
        };
        let ticker = match ticker {
            Ok(handle) => handle,
            Err(e) => {
                error!("Unable to start tick thread: {e:?}");
                let _ = cmd_tx.send(IngestCommand::Shutdown);
                let _ = ingest.join();
                return Err(PipelineError::ThreadSpawn("tick", e.to_string()));
            }
        };

        info!(
            "Pipeline started: tick {:?}, history {}, channel {}",
            settings.interval, settings.history_length, settings.channel_capacity
        );

        Ok(Self {
            sender: EventSender {
                tx: event_tx,
                open: Arc::new(RwLock::new(true)),
                stats: stats.clone(),
            },
            cmd_tx,
            stop_tx,
            ingest: Some(ingest),
            ticker: Some(ticker),
            history,
            latest,
            stats,
        })
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn submit(&self, event: PacketEvent) -> Result<(), SubmitError> {
        self.sender.submit(event)
    }

    pub fn history(&self) -> Arc<HistoryStore> {
        self.history.clone()
    }

    /// The most recent tick, if one has run.
    pub fn latest(&self) -> Option<TickResult> {
        self.latest.read().clone()
    }

    pub fn latest_verdict(&self) -> Option<CongestionVerdict> {
        self.latest.read().as_ref().map(|t| t.verdict)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Ask the ingestion actor for a summary of every flow. Gives up and
    /// returns an empty list if the actor does not answer promptly.
    pub fn flow_summaries(&self) -> Vec<FlowSummary> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self.cmd_tx.try_send(IngestCommand::FlowSummaries(tx)).is_err() {
            warn!("Could not submit flow command - buffer full");
            return Vec::new();
        }
        match rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(result) => result,
            Err(e) => {
                warn!("Timed out waiting for flow summaries: {e:?}");
                Vec::new()
            }
        }
    }

    /// Stop accepting events, let the ingestion actor finish what is
    /// queued, then run one last tick and stop the tick actor.
    pub fn stop(mut self) -> Result<PipelineSummary, PipelineError> {
        let (tracker, ticks) = self.shutdown()?;
        let summary = PipelineSummary {
            ticks,
            stats: self.stats.snapshot(),
            tracker,
            last_tick: self.latest(),
        };
        info!(
            "Pipeline stopped after {} ticks, {} events observed, {} dropped",
            summary.ticks, summary.stats.events_observed, summary.stats.events_dropped
        );
        Ok(summary)
    }

    fn shutdown(&mut self) -> Result<(TrackerCounters, u64), PipelineError> {
        // Waits out any submit already past the open check.
        *self.sender.open.write() = false;

        let mut tracker = TrackerCounters::default();
        if let Some(ingest) = self.ingest.take() {
            if self.cmd_tx.send(IngestCommand::Shutdown).is_err() {
                debug!("Ingestion actor already gone");
            }
            tracker = ingest
                .join()
                .map_err(|_| PipelineError::ThreadPanicked("ingestion"))?;
        }

        let mut ticks = 0;
        if let Some(ticker) = self.ticker.take() {
            let _ = self.stop_tx.send(());
            ticks = ticker
                .join()
                .map_err(|_| PipelineError::ThreadPanicked("tick"))?;
        }
        Ok((tracker, ticks))
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.ingest.is_some() || self.ticker.is_some() {
            if let Err(e) = self.shutdown() {
                error!("Error stopping pipeline: {e}");
            }
        }
    }
}

fn ingest_actor(
    mut tracker: FlowTracker,
    event_rx: Receiver<PacketEvent>,
    cmd_rx: Receiver<IngestCommand>,
    buffer: Arc<MetricBuffer>,
    stats: Arc<PipelineStats>,
) -> TrackerCounters {
    let mut batch = Vec::with_capacity(MAX_BATCH);
    loop {
        select! {
            recv(cmd_rx) -> msg => {
                match msg {
                    Ok(IngestCommand::ExpireIdleFlows) => {
                        let expired = tracker.expire_idle();
                        if expired > 0 {
                            debug!("Expired {expired} idle flows, {} remain", tracker.flow_count());
                        }
                        stats.sync_tracker(&tracker.counters(), tracker.flow_count());
                    }
                    Ok(IngestCommand::FlowSummaries(reply)) => {
                        let _ = reply.send(tracker.flow_summaries());
                    }
                    Ok(IngestCommand::Shutdown) | Err(_) => {
                        for event in event_rx.try_iter() {
                            batch.push(tracker.observe(&event));
                            if batch.len() >= MAX_BATCH {
                                publish(&mut batch, &buffer, &stats);
                            }
                        }
                        publish(&mut batch, &buffer, &stats);
                        stats.sync_tracker(&tracker.counters(), tracker.flow_count());
                        debug!("Ingestion actor finished");
                        return tracker.counters();
                    }
                }
            }
            recv(event_rx) -> msg => {
                let Ok(event) = msg else {
                    // Every sender is gone, which only happens once the
                    // handle itself has been dropped.
                    stats.sync_tracker(&tracker.counters(), tracker.flow_count());
                    return tracker.counters();
                };
                batch.push(tracker.observe(&event));
                while batch.len() < MAX_BATCH {
                    let Ok(event) = event_rx.try_recv() else { break };
                    batch.push(tracker.observe(&event));
                }
                let full_batch = batch.len() == MAX_BATCH;
                publish(&mut batch, &buffer, &stats);
                stats.sync_tracker(&tracker.counters(), tracker.flow_count());
                if full_batch {
                    std::thread::yield_now();
                }
            }
        }
    }
}

fn publish(
    batch: &mut Vec<InstantaneousMetric>,
    buffer: &MetricBuffer,
    stats: &PipelineStats,
) {
    if batch.is_empty() {
        return;
    }
    let refused = buffer.extend(batch);
    batch.clear();
    if refused > 0 {
        PipelineStats::add(&stats.metrics_dropped, refused as u64);
        warn!("Metric buffer full, dropped {refused} metrics");
    }
}

struct TickActor {
    aggregator: MetricAggregator,
    classifier: CongestionClassifier,
    buffer: Arc<MetricBuffer>,
    history: Arc<HistoryStore>,
    latest: Arc<RwLock<Option<TickResult>>>,
    stats: Arc<PipelineStats>,
    cmd_tx: Sender<IngestCommand>,
    idle_sweep_interval: Duration,
    last_sweep: Instant,
}

impl TickActor {
    fn run(mut self, interval: Duration, stop_rx: Receiver<()>) -> u64 {
        let ticker = crossbeam_channel::tick(interval);
        loop {
            select! {
                recv(ticker) -> msg => {
                    let now = msg.unwrap_or_else(|_| Instant::now());
                    self.tick(now);
                    self.maybe_sweep(now);
                }
                recv(stop_rx) -> _ => {
                    // Final flush: whatever ingestion produced before it
                    // stopped goes into one last snapshot.
                    self.tick(Instant::now());
                    debug!("Tick actor finished after {} ticks", self.aggregator.ticks());
                    return self.aggregator.ticks();
                }
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        let snapshot = self.aggregator.tick_at(&self.buffer, now);
        let verdict = self.classifier.classify(&snapshot);
        self.history.record(&snapshot, &verdict);
        PipelineStats::add(&self.stats.ticks, 1);
        *self.latest.write() = Some(TickResult { snapshot, verdict });
    }

    fn maybe_sweep(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < self.idle_sweep_interval {
            return;
        }
        self.last_sweep = now;
        if self.cmd_tx.try_send(IngestCommand::ExpireIdleFlows).is_err() {
            warn!("Could not submit flow command - buffer full");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FlowKey;
    use std::net::{IpAddr, Ipv4Addr};

    fn settings() -> PipelineSettings {
        PipelineSettings {
            interval: Duration::from_millis(10),
            history_length: 1000,
            channel_capacity: 4,
            ..Default::default()
        }
    }

    fn event(timestamp: u64) -> PacketEvent {
        PacketEvent {
            timestamp,
            key: FlowKey::new(
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                40000,
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                80,
            ),
            seq: Some(1),
            ack_seq: None,
            window_size: Some(1000),
            window_scale: None,
            payload_len: 10,
        }
    }

    #[test]
    fn stop_runs_final_tick() {
        let pipeline = Pipeline::start(PipelineSettings {
            interval: Duration::from_secs(3600),
            ..settings()
        })
        .unwrap();
        pipeline.submit(event(1)).unwrap();
        let summary = pipeline.stop().unwrap();
        assert_eq!(summary.ticks, 1);
        let last = summary.last_tick.unwrap();
        assert_eq!(last.snapshot.sample_count, 1);
        assert_eq!(last.snapshot.avg_window, Some(1000.0));
        assert_eq!(summary.stats.events_observed, 1);
    }

    #[test]
    fn sender_refuses_after_stop() {
        let pipeline = Pipeline::start(settings()).unwrap();
        let sender = pipeline.sender();
        assert!(sender.is_open());
        pipeline.stop().unwrap();
        assert_eq!(sender.submit(event(1)), Err(SubmitError::Closed));
    }

    #[test]
    fn full_channel_drops_and_counts() {
        let pipeline = Pipeline::start(settings()).unwrap();
        let sender = pipeline.sender();
        let mut dropped = 0;
        for i in 0..10_000 {
            if sender.submit(event(i)) == Err(SubmitError::Full) {
                dropped += 1;
            }
        }
        let summary = pipeline.stop().unwrap();
        assert_eq!(summary.stats.events_dropped, dropped);
        assert_eq!(
            summary.stats.events_submitted,
            summary.stats.events_observed
        );
        assert_eq!(summary.stats.events_submitted + dropped, 10_000);
    }

    #[test]
    fn stop_during_submits_loses_nothing() {
        let pipeline = Pipeline::start(PipelineSettings {
            channel_capacity: 1024,
            ..settings()
        })
        .unwrap();
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let sender = pipeline.sender();
                std::thread::spawn(move || {
                    let mut timestamp = 0;
                    loop {
                        timestamp += 1;
                        if sender.submit(event(timestamp)) == Err(SubmitError::Closed) {
                            break;
                        }
                    }
                })
            })
            .collect();
        std::thread::sleep(Duration::from_millis(20));
        let summary = pipeline.stop().unwrap();
        for producer in producers {
            producer.join().unwrap();
        }
        assert!(summary.stats.events_submitted > 0);
        assert_eq!(
            summary.stats.events_submitted,
            summary.stats.events_observed
        );
    }

    #[test]
    fn ticks_keep_running_without_events() {
        let pipeline = Pipeline::start(settings()).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let history = pipeline.history();
        let summary = pipeline.stop().unwrap();
        assert!(summary.ticks >= 2);
        let rtt = history.snapshot(crate::history::MetricName::Rtt);
        assert_eq!(rtt.len() as u64, summary.ticks);
        assert!(rtt.iter().all(|p| p.value.is_none()));
    }

    #[test]
    fn flow_summaries_answered() {
        let pipeline = Pipeline::start(settings()).unwrap();
        pipeline.submit(event(1)).unwrap();
        // The command and event channels are separate, so give the event a
        // moment to land before asking.
        let mut flows = Vec::new();
        for _ in 0..50 {
            flows = pipeline.flow_summaries();
            if !flows.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].bytes, 10);
        pipeline.stop().unwrap();
    }

    #[test]
    fn drop_stops_threads() {
        let pipeline = Pipeline::start(settings()).unwrap();
        let sender = pipeline.sender();
        drop(pipeline);
        assert!(!sender.is_open());
    }
}
