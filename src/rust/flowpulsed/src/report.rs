use flowpulse_tracker::{PipelineSummary, TickResult};
use flowpulse_utils::scale::{scale_bits, scale_packets};
use tracing::{info, warn};

fn optional(value: Option<f64>, unit: &str) -> String {
  match value {
    Some(v) => format!("{v:.2} {unit}"),
    None => "-".to_string(),
  }
}

/// One log line per reporting period, louder when congested.
pub fn log_tick(tick: &TickResult) {
  let s = &tick.snapshot;
  let v = &tick.verdict;
  let rtt = optional(s.avg_rtt.map(|r| r.as_millis()), "ms");
  let window = optional(s.avg_window, "bytes");
  if v.is_congested {
    warn!(
      "Congested at {:.1}s: score {:.2}, rtt {rtt}, window {window} (max {:.0}), {}",
      s.tick_time.as_secs_f64(),
      v.score,
      v.max_observed_window,
      scale_bits(s.throughput_bytes_per_sec),
    );
  } else {
    info!(
      "{:.1}s: {}, {}, rtt {rtt}, window {window}, score {:.2}",
      s.tick_time.as_secs_f64(),
      scale_bits(s.throughput_bytes_per_sec),
      scale_packets(s.packets_per_sec),
      v.score,
    );
  }
}

pub fn log_summary(summary: &PipelineSummary) {
  let stats = &summary.stats;
  info!(
    "{} ticks; {} events observed, {} dropped at the channel, {} metrics dropped",
    summary.ticks, stats.events_observed, stats.events_dropped, stats.metrics_dropped
  );
  info!(
    "{} RTT samples, {} negative RTTs discarded, {} pending evictions, {} flows expired",
    summary.tracker.rtt_samples,
    summary.tracker.negative_rtt_discarded,
    summary.tracker.pending_evicted,
    summary.tracker.flows_expired,
  );
  if let Some(last) = &summary.last_tick {
    log_tick(last);
  }
}
