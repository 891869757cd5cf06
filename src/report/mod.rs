//! Durable session reports.
//!
//! Provides the [`SessionReporter`] trait and the record format. The primary
//! implementation, [`JsonlReportWriter`], appends one JSON line per watcher
//! followed by a verdict line to daily-rotating files. [`read_report`] parses
//! those files back into [`SessionResult`]s.

pub mod writer;

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    HardTimeoutDetail, SessionResult, SessionState, Verdict, WatcherSnapshot, WatcherState,
};

/// One line of a session report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportLine {
    /// Final counters of one watcher.
    Watcher {
        /// Time the line was written.
        timestamp: DateTime<Utc>,
        /// Owning session identifier.
        session_id: String,
        /// Owning session name.
        session_name: String,
        /// Watcher counters.
        watcher: WatcherSnapshot,
    },
    /// Overall outcome; always the last line of a session record.
    Verdict {
        /// Time the line was written.
        timestamp: DateTime<Utc>,
        /// Session identifier.
        session_id: String,
        /// Session name.
        session_name: String,
        /// Wall-clock start.
        started_at: DateTime<Utc>,
        /// Wall-clock end.
        ended_at: DateTime<Utc>,
        /// Monotonic session duration.
        elapsed_ms: u64,
        /// Final lifecycle state.
        state: SessionState,
        /// Overall verdict.
        verdict: Verdict,
        /// Hard timeout that aborted the session, if any.
        hard_timeout: Option<HardTimeoutDetail>,
    },
}

impl ReportLine {
    /// Split a result into its report lines, watchers first.
    #[must_use]
    pub fn from_result(result: &SessionResult, timestamp: DateTime<Utc>) -> Vec<Self> {
        let mut lines: Vec<Self> = result
            .watchers
            .iter()
            .map(|watcher| Self::Watcher {
                timestamp,
                session_id: result.session_id.clone(),
                session_name: result.session_name.clone(),
                watcher: watcher.clone(),
            })
            .collect();
        lines.push(Self::Verdict {
            timestamp,
            session_id: result.session_id.clone(),
            session_name: result.session_name.clone(),
            started_at: result.started_at,
            ended_at: result.ended_at,
            elapsed_ms: result.elapsed_ms,
            state: result.state,
            verdict: result.verdict,
            hard_timeout: result.hard_timeout.clone(),
        });
        lines
    }
}

/// Writes session results to a durable, append-only store.
///
/// Implementations must be [`Send`] and [`Sync`] so one reporter can be
/// shared across tasks via [`std::sync::Arc`].
pub trait SessionReporter: Send + Sync {
    /// Append the record of one finished session.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn record(&self, result: &SessionResult) -> crate::Result<()>;
}

/// Render a result as plain text: one line per watcher and a verdict line.
#[must_use]
pub fn render_summary(result: &SessionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "session {} ({}) started {} ended {} after {} ms: {}",
        result.session_name,
        result.session_id,
        result.started_at.to_rfc3339(),
        result.ended_at.to_rfc3339(),
        result.elapsed_ms,
        state_label(result.state)
    );
    for w in &result.watchers {
        let _ = writeln!(
            out,
            "  {} state={} messages={} soft_timeouts={} out_of_bounds={} hard_timeout={} longest_gap_ms={}",
            w.stream_id,
            watcher_state_label(w.state),
            w.message_count,
            w.soft_timeout_count,
            w.out_of_bounds_count,
            w.hard_timeout_silence_ms
                .map_or_else(|| "no".to_owned(), |ms| format!("after {ms} ms")),
            w.longest_gap_ms
        );
    }
    let _ = write!(out, "verdict: {}", verdict_label(result.verdict));
    if let Some(detail) = &result.hard_timeout {
        let _ = write!(
            out,
            " (stream {} silent for {} ms)",
            detail.stream_id, detail.silence_ms
        );
    }
    out.push('\n');
    out
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Idle => "idle",
        SessionState::Running => "running",
        SessionState::Completed => "completed",
        SessionState::AbortedOnHardTimeout => "aborted on hard timeout",
        SessionState::Cancelled => "cancelled by operator",
    }
}

fn watcher_state_label(state: WatcherState) -> &'static str {
    match state {
        WatcherState::Idle => "idle",
        WatcherState::Live => "live",
        WatcherState::SoftTimedOut => "soft_timed_out",
        WatcherState::HardTimedOut => "hard_timed_out",
    }
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => "PASS",
        Verdict::PassWithWarnings => "PASS WITH WARNINGS",
        Verdict::Fail => "FAIL",
    }
}

pub use writer::{read_report, JsonlReportWriter};
