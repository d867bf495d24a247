//! End-to-end runs of the pipeline: events in, history out.

use flowpulse_tracker::{
    run_source, FlowKey, JsonLinesSource, MetricName, PacketEvent, Pipeline, PipelineSettings,
    TrackerConfig, VecSource,
};
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const MS: u64 = 1_000_000;

fn client() -> FlowKey {
    FlowKey::new(
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
        51000,
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        8080,
    )
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        interval: Duration::from_millis(20),
        history_length: 500,
        ..Default::default()
    }
}

fn request_and_ack(seq: u32, sent: u64, acked: u64) -> [PacketEvent; 2] {
    [
        PacketEvent {
            timestamp: sent,
            key: client(),
            seq: Some(seq),
            ack_seq: None,
            window_size: Some(65535),
            window_scale: None,
            payload_len: 50,
        },
        PacketEvent {
            timestamp: acked,
            key: client().reversed(),
            seq: Some(1),
            ack_seq: Some(seq),
            window_size: Some(65535),
            window_scale: None,
            payload_len: 0,
        },
    ]
}

#[test]
fn rtt_reaches_history() {
    let pipeline = Pipeline::start(settings()).unwrap();
    let mut source = VecSource::new(request_and_ack(1000, 0, 20 * MS).to_vec());
    let summary = run_source(&mut source, &pipeline.sender()).unwrap();
    assert_eq!(summary.events_submitted, 2);

    let history = pipeline.history();
    let result = pipeline.stop().unwrap();

    let rtt = history.snapshot(MetricName::Rtt);
    assert_eq!(rtt.len() as u64, result.ticks);
    let samples: Vec<f64> = rtt.iter().filter_map(|p| p.value).collect();
    assert_eq!(samples, vec![20.0]);

    assert_eq!(result.tracker.rtt_samples, 1);
    assert_eq!(result.stats.events_observed, 2);
    assert!(result.last_tick.is_some());

    let throughput: f64 = history
        .snapshot(MetricName::Throughput)
        .iter()
        .filter_map(|p| p.value)
        .sum();
    assert!(throughput > 0.0);
}

#[test]
fn json_lines_end_to_end() {
    let text = concat!(
        r#"{"timestamp": 0, "src": "10.0.0.1", "src_port": 40000, "dst": "10.0.0.2", "dst_port": 80, "seq": 1000, "payload_len": 50, "window_size": 1000}"#,
        "\n",
        "garbage\n",
        r#"{"timestamp": 250000000, "src": "10.0.0.2", "src_port": 80, "dst": "10.0.0.1", "dst_port": 40000, "seq": 1, "ack_seq": 1000, "window_size": 1000}"#,
        "\n",
    );
    let pipeline = Pipeline::start(settings()).unwrap();
    let mut source = JsonLinesSource::new(Cursor::new(text.as_bytes().to_vec()), false);
    run_source(&mut source, &pipeline.sender()).unwrap();
    assert_eq!(source.skipped(), 1);

    let history = pipeline.history();
    pipeline.stop().unwrap();

    // 250ms is above the default 100ms threshold.
    let congestion = history.snapshot(MetricName::Congestion);
    assert!(congestion.iter().any(|p| p.flag == Some(true)));
    assert_eq!(history.congestion_events().len(), 1);
}

#[test]
fn idle_flows_swept_by_capture_clock() {
    let pipeline = Pipeline::start(PipelineSettings {
        idle_sweep_interval: Duration::from_millis(20),
        tracker: TrackerConfig {
            idle_timeout: Duration::from_secs(1),
            pending_capacity: 16,
        },
        ..settings()
    })
    .unwrap();

    let sender = pipeline.sender();
    let [request, _] = request_and_ack(1000, 0, 0);
    sender.submit(request).unwrap();
    let mut later = request_and_ack(2000, 5_000 * MS, 0)[0].clone();
    later.key = FlowKey::new(
        IpAddr::V4(Ipv4Addr::new(10, 9, 9, 9)),
        1,
        IpAddr::V4(Ipv4Addr::new(10, 9, 9, 8)),
        2,
    );
    sender.submit(later).unwrap();

    let mut flows = Vec::new();
    for _ in 0..100 {
        std::thread::sleep(Duration::from_millis(10));
        flows = pipeline.flow_summaries();
        if flows.len() == 1 && flows[0].first_seen == 5_000 * MS {
            break;
        }
    }
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].first_seen, 5_000 * MS);
    let summary = pipeline.stop().unwrap();
    assert_eq!(summary.tracker.flows_expired, 1);
}
