//! Unit tests for session lifecycle transitions, verdict reduction, and
//! exit codes.

use chrono::Utc;

use endurance_watch::models::{
    HardTimeoutDetail, SessionResult, SessionState, Verdict, WatcherSnapshot, WatcherState,
    EXIT_CANCELLED, EXIT_HARD_TIMEOUT, EXIT_PASS,
};

fn snapshot(id: &str) -> WatcherSnapshot {
    WatcherSnapshot {
        stream_id: id.to_owned(),
        soft_timeout_ms: 100,
        hard_timeout_ms: 1000,
        message_count: 10,
        soft_timeout_count: 0,
        out_of_bounds_count: 0,
        hard_timeout_triggered: false,
        hard_timeout_silence_ms: None,
        longest_gap_ms: 50,
        hook: None,
        state: WatcherState::Live,
    }
}

fn hard_timed_out(id: &str) -> WatcherSnapshot {
    WatcherSnapshot {
        hard_timeout_triggered: true,
        hard_timeout_silence_ms: Some(1010),
        state: WatcherState::HardTimedOut,
        ..snapshot(id)
    }
}

fn result(state: SessionState, watchers: Vec<WatcherSnapshot>) -> SessionResult {
    let now = Utc::now();
    SessionResult {
        session_id: "s-1".into(),
        session_name: "unit".into(),
        started_at: now,
        ended_at: now,
        elapsed_ms: 0,
        state,
        verdict: Verdict::from_snapshots(&watchers),
        hard_timeout: None,
        watchers,
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn legal_transitions() {
    assert!(SessionState::Idle.can_transition_to(SessionState::Running));
    for end in [
        SessionState::Completed,
        SessionState::AbortedOnHardTimeout,
        SessionState::Cancelled,
    ] {
        assert!(SessionState::Running.can_transition_to(end), "{end:?}");
        assert!(end.is_terminal());
    }
}

#[test]
fn illegal_transitions() {
    assert!(!SessionState::Idle.can_transition_to(SessionState::Completed));
    assert!(!SessionState::Running.can_transition_to(SessionState::Idle));
    assert!(!SessionState::Running.can_transition_to(SessionState::Running));
    assert!(!SessionState::Completed.can_transition_to(SessionState::Running));
    assert!(!SessionState::Cancelled.can_transition_to(SessionState::Completed));
    assert!(!SessionState::Idle.is_terminal());
    assert!(!SessionState::Running.is_terminal());
}

#[test]
fn state_serializes_snake_case() {
    let json = serde_json::to_string(&SessionState::AbortedOnHardTimeout).expect("serialize");
    assert_eq!(json, "\"aborted_on_hard_timeout\"");
}

// ── Verdict ──────────────────────────────────────────────────────────────────

#[test]
fn no_watchers_is_pass() {
    assert_eq!(Verdict::from_snapshots(&[]), Verdict::Pass);
}

#[test]
fn clean_watchers_pass() {
    assert_eq!(
        Verdict::from_snapshots(&[snapshot("a"), snapshot("b")]),
        Verdict::Pass
    );
}

#[test]
fn soft_timeout_gives_warnings() {
    let mut soft = snapshot("a");
    soft.soft_timeout_count = 1;
    assert!(soft.has_warnings());
    assert_eq!(
        Verdict::from_snapshots(&[soft, snapshot("b")]),
        Verdict::PassWithWarnings
    );
}

#[test]
fn out_of_bounds_gives_warnings() {
    let mut noisy = snapshot("a");
    noisy.out_of_bounds_count = 3;
    assert_eq!(
        Verdict::from_snapshots(&[noisy]),
        Verdict::PassWithWarnings
    );
}

#[test]
fn any_hard_timeout_fails() {
    let mut soft = snapshot("a");
    soft.soft_timeout_count = 1;
    let verdict = Verdict::from_snapshots(&[soft, hard_timed_out("b")]);
    assert_eq!(verdict, Verdict::Fail);
    assert!(!verdict.is_pass());
    assert!(Verdict::PassWithWarnings.is_pass());
}

// ── Exit codes ───────────────────────────────────────────────────────────────

#[test]
fn exit_code_pass_and_warnings_is_zero() {
    assert_eq!(
        result(SessionState::Completed, vec![snapshot("a")]).exit_code(),
        EXIT_PASS
    );
    let mut soft = snapshot("a");
    soft.soft_timeout_count = 2;
    assert_eq!(
        result(SessionState::Completed, vec![soft]).exit_code(),
        EXIT_PASS
    );
}

#[test]
fn exit_code_hard_timeout_is_one() {
    let mut aborted = result(
        SessionState::AbortedOnHardTimeout,
        vec![snapshot("a"), hard_timed_out("b")],
    );
    aborted.hard_timeout = Some(HardTimeoutDetail {
        stream_id: "b".into(),
        silence_ms: 1010,
    });
    assert_eq!(aborted.exit_code(), EXIT_HARD_TIMEOUT);
}

#[test]
fn exit_code_cancel_is_two() {
    assert_eq!(
        result(SessionState::Cancelled, vec![snapshot("a")]).exit_code(),
        EXIT_CANCELLED
    );
}

#[test]
fn exit_code_fail_wins_over_cancel() {
    assert_eq!(
        result(SessionState::Cancelled, vec![hard_timed_out("a")]).exit_code(),
        EXIT_HARD_TIMEOUT
    );
}

#[test]
fn watcher_lookup_by_stream_id() {
    let r = result(SessionState::Completed, vec![snapshot("a"), snapshot("b")]);
    assert_eq!(r.watcher("b").map(|w| w.stream_id.as_str()), Some("b"));
    assert!(r.watcher("c").is_none());
}
