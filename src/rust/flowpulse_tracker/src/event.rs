//! Packet events, as delivered by the capture layer.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::IpAddr;

/// Largest window scale shift TCP permits (RFC 7323).
pub const MAX_WINDOW_SCALE: u8 = 14;

/// Identifies one direction of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub src: IpAddr,
    pub src_port: u16,
    pub dst: IpAddr,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(src: IpAddr, src_port: u16, dst: IpAddr, dst_port: u16) -> Self {
        Self {
            src,
            src_port,
            dst,
            dst_port,
        }
    }

    /// The key of the opposite direction of the same connection.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            src_port: self.dst_port,
            dst: self.src,
            dst_port: self.src_port,
        }
    }
}

impl Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {}",
            std::net::SocketAddr::new(self.src, self.src_port),
            std::net::SocketAddr::new(self.dst, self.dst_port)
        )
    }
}

/// One observed TCP segment.
///
/// Fields the decoder could not supply are `None`; the tracker uses
/// whatever is present and skips the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketEvent {
    /// Capture time, in nanoseconds on a monotonic clock.
    pub timestamp: u64,
    pub key: FlowKey,
    pub seq: Option<u32>,
    pub ack_seq: Option<u32>,
    /// Raw advertised receive window, as found in the TCP header.
    pub window_size: Option<u32>,
    /// Window scale shift negotiated for this direction, if known.
    pub window_scale: Option<u8>,
    /// TCP payload bytes carried by the segment.
    pub payload_len: u32,
}

impl PacketEvent {
    /// Advertised window in bytes, applying the scale shift when known.
    pub fn window_bytes(&self) -> Option<u64> {
        let raw = u64::from(self.window_size?);
        let shift = self.window_scale.unwrap_or(0).min(MAX_WINDOW_SCALE);
        Some(raw << shift)
    }
}
