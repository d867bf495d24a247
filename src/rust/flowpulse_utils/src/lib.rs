//! Collection of utility functions shared by the FlowPulse crates

#![warn(missing_docs)]

/// Strongly-typed round-trip time values
pub mod rtt;

/// Utilities for scaling byte and packet rates to human-readable format
pub mod scale;

/// Utilities dealing with the boot-relative kernel clock
pub mod unix_time;
