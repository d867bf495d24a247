//! Real-time TCP congestion metrics.
//!
//! Packet events flow through four stages:
//!
//! 1. [`FlowTracker`] keeps per-direction flow state and pairs data
//!    segments with the acknowledgements that answer them, yielding one
//!    [`InstantaneousMetric`] per event.
//! 2. [`MetricAggregator`] turns everything seen during one tick into an
//!    [`AggregateSnapshot`].
//! 3. [`CongestionClassifier`] scores each snapshot.
//! 4. [`HistoryStore`] keeps a bounded series per metric for display.
//!
//! [`Pipeline`] runs the stages on two threads; feed it through an
//! [`EventSender`] or an [`EventSource`].

pub mod aggregator;
pub mod classifier;
pub mod event;
pub mod flow_tracker;
pub mod history;
pub mod pipeline;
pub mod settings;
pub mod source;
pub mod stats;

pub use aggregator::{AggregateSnapshot, MetricAggregator, MetricBuffer};
pub use classifier::{classify, ClassifierConfig, CongestionClassifier, CongestionVerdict};
pub use event::{FlowKey, PacketEvent};
pub use flow_tracker::{FlowSummary, FlowTracker, InstantaneousMetric, TrackerConfig, TrackerCounters};
pub use history::{HistoryExport, HistoryPoint, HistoryStore, MetricName};
pub use pipeline::{EventSender, Pipeline, PipelineError, PipelineSummary, SubmitError, TickResult};
pub use settings::PipelineSettings;
pub use source::{run_source, EventSource, JsonLinesSource, SourceError, SourceSummary, VecSource};
pub use stats::{PipelineStats, StatsSnapshot};
