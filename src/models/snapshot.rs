//! Point-in-time view of a single watcher's counters.

use serde::{Deserialize, Serialize};

/// Liveness state of a watched stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    /// Armed, no message received yet.
    Idle,
    /// At least one message received and within the soft threshold.
    Live,
    /// Silent past the soft threshold; returns to `Live` on the next message.
    SoftTimedOut,
    /// Silent past the hard threshold. Terminal for the session.
    HardTimedOut,
}

/// Immutable copy of a watcher's counters, thresholds, and state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatcherSnapshot {
    /// Monitored stream identifier.
    pub stream_id: String,
    /// Soft silence threshold in milliseconds.
    pub soft_timeout_ms: u64,
    /// Hard silence threshold in milliseconds.
    pub hard_timeout_ms: u64,
    /// Messages received.
    pub message_count: u64,
    /// Distinct silence episodes past the soft threshold.
    pub soft_timeout_count: u64,
    /// Messages flagged by the validation hook (including hook failures).
    pub out_of_bounds_count: u64,
    /// Whether the hard threshold was crossed.
    pub hard_timeout_triggered: bool,
    /// Silence measured when the hard threshold tripped.
    pub hard_timeout_silence_ms: Option<u64>,
    /// Longest gap observed between consecutive messages.
    pub longest_gap_ms: u64,
    /// Name of the attached validation hook, if any.
    pub hook: Option<String>,
    /// Liveness state when the snapshot was taken.
    pub state: WatcherState,
}

impl WatcherSnapshot {
    /// Whether the watcher recorded any soft timeout or out-of-bounds event.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.soft_timeout_count > 0 || self.out_of_bounds_count > 0
    }
}
