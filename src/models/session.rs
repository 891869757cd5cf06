//! Session lifecycle, verdict, and aggregated result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::WatcherSnapshot;

/// Exit status for a session that finished with `Pass` or `PassWithWarnings`.
pub const EXIT_PASS: i32 = 0;
/// Exit status for a session aborted by a hard timeout.
pub const EXIT_HARD_TIMEOUT: i32 = 1;
/// Exit status for a session cancelled by the operator.
pub const EXIT_CANCELLED: i32 = 2;

/// Lifecycle status for a monitoring session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Configured, accepting registrations.
    Idle,
    /// Watchers armed and ticking.
    Running,
    /// Ended normally at the end of its duration.
    Completed,
    /// Ended early because a watcher crossed its hard threshold.
    AbortedOnHardTimeout,
    /// Ended early by an operator abort.
    Cancelled,
}

impl SessionState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (
                    Self::Running,
                    Self::Completed | Self::AbortedOnHardTimeout | Self::Cancelled
                )
        )
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::AbortedOnHardTimeout | Self::Cancelled
        )
    }
}

/// Overall outcome of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No watcher timed out or flagged a message.
    Pass,
    /// No hard timeout, but soft timeouts or out-of-bounds messages occurred.
    PassWithWarnings,
    /// At least one watcher crossed its hard threshold.
    Fail,
}

impl Verdict {
    /// Compute the verdict from the final watcher snapshots.
    #[must_use]
    pub fn from_snapshots(snapshots: &[WatcherSnapshot]) -> Self {
        if snapshots.iter().any(|s| s.hard_timeout_triggered) {
            Self::Fail
        } else if snapshots.iter().any(WatcherSnapshot::has_warnings) {
            Self::PassWithWarnings
        } else {
            Self::Pass
        }
    }

    /// Whether the verdict counts as passing.
    #[must_use]
    pub fn is_pass(self) -> bool {
        !matches!(self, Self::Fail)
    }
}

/// Diagnostic for the hard timeout that aborted a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HardTimeoutDetail {
    /// Stream whose silence aborted the session.
    pub stream_id: String,
    /// Silence measured when the threshold tripped.
    pub silence_ms: u64,
}

/// Aggregated result of one monitoring session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionResult {
    /// Unique session identifier.
    pub session_id: String,
    /// Human-assigned session name.
    pub session_name: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub ended_at: DateTime<Utc>,
    /// Monotonic session duration.
    pub elapsed_ms: u64,
    /// Final lifecycle state.
    pub state: SessionState,
    /// Overall verdict.
    pub verdict: Verdict,
    /// First hard timeout observed, if the session was aborted by one.
    pub hard_timeout: Option<HardTimeoutDetail>,
    /// Per-watcher snapshots in registration order.
    pub watchers: Vec<WatcherSnapshot>,
}

impl SessionResult {
    /// Process exit status for this result.
    ///
    /// `0` for a passing session that ran to completion, `1` for a
    /// hard-timeout failure, `2` for an operator cancel.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match (self.verdict, self.state) {
            (Verdict::Fail, _) => EXIT_HARD_TIMEOUT,
            (_, SessionState::Cancelled) => EXIT_CANCELLED,
            _ => EXIT_PASS,
        }
    }

    /// Look up a watcher snapshot by stream id.
    #[must_use]
    pub fn watcher(&self, stream_id: &str) -> Option<&WatcherSnapshot> {
        self.watchers.iter().find(|w| w.stream_id == stream_id)
    }
}
