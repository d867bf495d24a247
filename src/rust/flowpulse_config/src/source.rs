//! Where packet events come from.
//!
//! FlowPulse does not decode packets itself. An upstream decoder writes
//! one JSON object per observed segment, either to our stdin or to a file.

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// Read events from this file instead of stdin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Stamp events that arrive without a timestamp with the time since
    /// boot. When false, such events are skipped.
    pub stamp_missing_timestamps: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            stamp_missing_timestamps: true,
        }
    }
}
