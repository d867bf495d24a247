//! Packet event sources.
//!
//! The pipeline does not decode packets. Something upstream (a `tshark`
//! filter, a replay file, a test) produces [`PacketEvent`]s and an
//! [`EventSource`] hands them over one at a time.
//!
//! [`JsonLinesSource`] reads one JSON object per line:
//!
//! ```text
//! {"timestamp": 20000000, "src": "10.0.0.2", "src_port": 80,
//!  "dst": "10.0.0.1", "dst_port": 40000, "seq": 1, "ack_seq": 1000,
//!  "window_size": 512, "window_scale": 7, "payload_len": 0}
//! ```
//!
//! Numbers may also be given as strings, which is how `tshark -T ek`
//! writes them. Fields that are missing or unreadable are left out of the
//! event; a line without the addresses and ports cannot be attributed to
//! a flow and is skipped.

use crate::event::{FlowKey, PacketEvent};
use crate::pipeline::{EventSender, SubmitError};
use flowpulse_utils::unix_time::nanos_since_boot;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unable to open event source {0}: {1}")]
    Open(String, std::io::Error),
    #[error("Error reading event source: {0}")]
    Io(#[from] std::io::Error),
    #[error("Pipeline stopped accepting events")]
    PipelineClosed,
}

/// Anything that yields packet events in capture order.
pub trait EventSource {
    /// The next event, or `None` once the source is exhausted.
    fn next_event(&mut self) -> Result<Option<PacketEvent>, SourceError>;
}

impl<T: EventSource + ?Sized> EventSource for Box<T> {
    fn next_event(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        (**self).next_event()
    }
}

/// Replays a fixed list of events. Mostly useful for tests and demos.
#[derive(Debug, Default)]
pub struct VecSource {
    events: std::collections::VecDeque<PacketEvent>,
}

impl VecSource {
    pub fn new(events: Vec<PacketEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

impl EventSource for VecSource {
    fn next_event(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        Ok(self.events.pop_front())
    }
}

pub struct JsonLinesSource<R: BufRead> {
    reader: R,
    line: String,
    line_number: u64,
    skipped: u64,
    stamp_missing_timestamps: bool,
}

impl JsonLinesSource<BufReader<File>> {
    pub fn open(path: &Path, stamp_missing_timestamps: bool) -> Result<Self, SourceError> {
        let file =
            File::open(path).map_err(|e| SourceError::Open(path.display().to_string(), e))?;
        info!("Reading packet events from {}", path.display());
        Ok(Self::new(BufReader::new(file), stamp_missing_timestamps))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R, stamp_missing_timestamps: bool) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
            skipped: 0,
            stamp_missing_timestamps,
        }
    }

    /// Lines read so far that did not produce an event.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn parse_line(&self, line: &str) -> Option<PacketEvent> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Line {}: not valid JSON, skipping ({e})", self.line_number);
                return None;
            }
        };
        let Some(obj) = value.as_object() else {
            warn!("Line {}: expected a JSON object, skipping", self.line_number);
            return None;
        };

        let key = match flow_key(obj) {
            Some(key) => key,
            None => {
                warn!("Line {}: no usable addresses/ports, skipping", self.line_number);
                return None;
            }
        };

        let timestamp = match number(obj, &["timestamp", "ts"]) {
            Some(ts) => ts,
            None if self.stamp_missing_timestamps => nanos_since_boot().ok()?,
            None => {
                debug!("Line {}: no timestamp, skipping", self.line_number);
                return None;
            }
        };

        Some(PacketEvent {
            timestamp,
            key,
            seq: number(obj, &["seq"]).and_then(|n| u32::try_from(n).ok()),
            ack_seq: number(obj, &["ack_seq", "ack"]).and_then(|n| u32::try_from(n).ok()),
            window_size: number(obj, &["window_size", "window_size_value", "window"])
                .and_then(|n| u32::try_from(n).ok()),
            window_scale: number(obj, &["window_scale"]).and_then(|n| u8::try_from(n).ok()),
            payload_len: number(obj, &["payload_len", "len"])
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
        })
    }
}

impl<R: BufRead> EventSource for JsonLinesSource<R> {
    fn next_event(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            match self.parse_line(line) {
                Some(event) => return Ok(Some(event)),
                None => self.skipped += 1,
            }
        }
    }
}

/// First of `names` present in `obj`, read as an unsigned integer.
/// Accepts JSON numbers and numeric strings.
fn number(obj: &Map<String, Value>, names: &[&str]) -> Option<u64> {
    let value = names.iter().find_map(|name| obj.get(*name))?;
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn address(obj: &Map<String, Value>, names: &[&str]) -> Option<IpAddr> {
    names
        .iter()
        .find_map(|name| obj.get(*name))
        .and_then(Value::as_str)
        .and_then(|s| s.trim().parse().ok())
}

fn port(obj: &Map<String, Value>, names: &[&str]) -> Option<u16> {
    number(obj, names).and_then(|n| u16::try_from(n).ok())
}

fn flow_key(obj: &Map<String, Value>) -> Option<FlowKey> {
    Some(FlowKey::new(
        address(obj, &["src", "ip_src"])?,
        port(obj, &["src_port", "srcport"])?,
        address(obj, &["dst", "ip_dst"])?,
        port(obj, &["dst_port", "dstport"])?,
    ))
}

/// What [`run_source`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub events_read: u64,
    pub events_submitted: u64,
    pub events_dropped: u64,
}

/// Pump every event from `source` into the pipeline until the source runs
/// dry. Events refused because the pipeline is busy are counted and
/// skipped; a stopped pipeline or a source error ends the run.
pub fn run_source<S: EventSource + ?Sized>(
    source: &mut S,
    sender: &EventSender,
) -> Result<SourceSummary, SourceError> {
    let mut summary = SourceSummary::default();
    while let Some(event) = source.next_event()? {
        summary.events_read += 1;
        match sender.submit(event) {
            Ok(()) => summary.events_submitted += 1,
            Err(SubmitError::Full) => summary.events_dropped += 1,
            Err(SubmitError::Closed) => return Err(SourceError::PipelineClosed),
        }
    }
    info!(
        "Event source finished: {} read, {} submitted, {} dropped",
        summary.events_read, summary.events_submitted, summary.events_dropped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    fn source(text: &str) -> JsonLinesSource<Cursor<Vec<u8>>> {
        JsonLinesSource::new(Cursor::new(text.as_bytes().to_vec()), false)
    }

    fn drain(text: &str) -> (Vec<PacketEvent>, u64) {
        let mut src = source(text);
        let mut events = Vec::new();
        while let Some(event) = src.next_event().unwrap() {
            events.push(event);
        }
        (events, src.skipped())
    }

    #[test]
    fn full_line() {
        let (events, skipped) = drain(
            r#"{"timestamp": 20000000, "src": "10.0.0.2", "src_port": 80, "dst": "10.0.0.1", "dst_port": 40000, "seq": 1, "ack_seq": 1000, "window_size": 512, "window_scale": 7, "payload_len": 0}"#,
        );
        assert_eq!(skipped, 0);
        let event = &events[0];
        assert_eq!(event.timestamp, 20_000_000);
        assert_eq!(event.key.src, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(event.key.dst_port, 40000);
        assert_eq!(event.ack_seq, Some(1000));
        assert_eq!(event.window_bytes(), Some(512 << 7));
    }

    #[test]
    fn partial_fields_are_absent() {
        let (events, _) = drain(
            r#"{"timestamp": "5", "src": "::1", "src_port": "1", "dst": "::1", "dst_port": 2, "seq": "abc", "window_size": null}"#,
        );
        let event = &events[0];
        assert_eq!(event.timestamp, 5);
        assert_eq!(event.seq, None);
        assert_eq!(event.ack_seq, None);
        assert_eq!(event.window_size, None);
        assert_eq!(event.payload_len, 0);
    }

    #[test]
    fn bad_lines_are_skipped() {
        let text = concat!(
            "not json\n",
            "\n",
            "[1, 2]\n",
            r#"{"timestamp": 1, "src": "10.0.0.1", "src_port": 1, "dst_port": 2}"#,
            "\n",
            r#"{"timestamp": 2, "src": "10.0.0.1", "src_port": 70000, "dst": "10.0.0.2", "dst_port": 2}"#,
            "\n",
            r#"{"timestamp": 3, "src": "10.0.0.1", "src_port": 1, "dst": "10.0.0.2", "dst_port": 2, "len": 9}"#,
            "\n",
        );
        let (events, skipped) = drain(text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 3);
        assert_eq!(events[0].payload_len, 9);
        assert_eq!(skipped, 4);
    }

    #[test]
    fn missing_timestamp() {
        let line = r#"{"src": "10.0.0.1", "src_port": 1, "dst": "10.0.0.2", "dst_port": 2}"#;
        let (events, skipped) = drain(line);
        assert!(events.is_empty());
        assert_eq!(skipped, 1);

        let mut stamped = JsonLinesSource::new(Cursor::new(line.as_bytes().to_vec()), true);
        // CLOCK_BOOTTIME is always available on Linux.
        assert!(stamped.next_event().unwrap().is_some());
    }

    #[test]
    fn vec_source_drains_in_order() {
        let (events, _) = drain(concat!(
            r#"{"timestamp": 1, "src": "10.0.0.1", "src_port": 1, "dst": "10.0.0.2", "dst_port": 2}"#,
            "\n",
            r#"{"timestamp": 2, "src": "10.0.0.1", "src_port": 1, "dst": "10.0.0.2", "dst_port": 2}"#,
        ));
        let mut vec_source = VecSource::new(events);
        assert_eq!(vec_source.next_event().unwrap().map(|e| e.timestamp), Some(1));
        assert_eq!(vec_source.next_event().unwrap().map(|e| e.timestamp), Some(2));
        assert!(vec_source.next_event().unwrap().is_none());
    }
}
