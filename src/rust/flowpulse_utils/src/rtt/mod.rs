//! RTT (round-trip time) types and helpers.
//!
//! These types are shared between crates (e.g. `flowpulse_tracker` and
//! `flowpulse_config`) so thresholds and samples use the same units.

mod rtt_data;

pub use rtt_data::RttData;
