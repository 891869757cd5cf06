//! Contract tests for the report line format.
//!
//! Downstream tooling parses these files, so field names and enum spellings
//! are fixed.

use chrono::{TimeZone, Utc};
use serde_json::Value;

use endurance_watch::models::{
    HardTimeoutDetail, SessionResult, SessionState, Verdict, WatcherSnapshot, WatcherState,
};
use endurance_watch::report::ReportLine;

fn result() -> SessionResult {
    let at = Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap();
    SessionResult {
        session_id: "b1c2".into(),
        session_name: "contract".into(),
        started_at: at,
        ended_at: at,
        elapsed_ms: 31_000,
        state: SessionState::AbortedOnHardTimeout,
        verdict: Verdict::Fail,
        hard_timeout: Some(HardTimeoutDetail {
            stream_id: "/cam".into(),
            silence_ms: 30_010,
        }),
        watchers: vec![WatcherSnapshot {
            stream_id: "/cam".into(),
            soft_timeout_ms: 100,
            hard_timeout_ms: 30_000,
            message_count: 7,
            soft_timeout_count: 1,
            out_of_bounds_count: 2,
            hard_timeout_triggered: true,
            hard_timeout_silence_ms: Some(30_010),
            longest_gap_ms: 80,
            hook: Some("noise".into()),
            state: WatcherState::HardTimedOut,
        }],
    }
}

fn lines() -> Vec<Value> {
    let timestamp = Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 31).unwrap();
    ReportLine::from_result(&result(), timestamp)
        .iter()
        .map(|line| serde_json::to_value(line).expect("serialize"))
        .collect()
}

#[test]
fn watcher_line_fields() {
    let watcher = &lines()[0];
    assert_eq!(watcher["kind"], "watcher");
    assert_eq!(watcher["session_id"], "b1c2");
    assert_eq!(watcher["session_name"], "contract");
    assert!(watcher["timestamp"].is_string());

    let body = &watcher["watcher"];
    for field in [
        "stream_id",
        "soft_timeout_ms",
        "hard_timeout_ms",
        "message_count",
        "soft_timeout_count",
        "out_of_bounds_count",
        "hard_timeout_triggered",
        "hard_timeout_silence_ms",
        "longest_gap_ms",
        "hook",
        "state",
    ] {
        assert!(body.get(field).is_some(), "missing watcher field {field}");
    }
    assert_eq!(body["state"], "hard_timed_out");
    assert_eq!(body["out_of_bounds_count"], 2);
}

#[test]
fn verdict_line_fields() {
    let all = lines();
    assert_eq!(all.len(), 2, "one watcher line plus the verdict");
    let verdict = &all[1];
    assert_eq!(verdict["kind"], "verdict");
    assert_eq!(verdict["state"], "aborted_on_hard_timeout");
    assert_eq!(verdict["verdict"], "fail");
    assert_eq!(verdict["elapsed_ms"], 31_000);
    assert_eq!(verdict["hard_timeout"]["stream_id"], "/cam");
    assert_eq!(verdict["hard_timeout"]["silence_ms"], 30_010);
    assert_eq!(verdict["started_at"], "2026-05-04T08:30:00Z");
}

#[test]
fn verdict_spellings() {
    for (verdict, expected) in [
        (Verdict::Pass, "pass"),
        (Verdict::PassWithWarnings, "pass_with_warnings"),
        (Verdict::Fail, "fail"),
    ] {
        assert_eq!(serde_json::to_value(verdict).expect("serialize"), expected);
    }
}

#[test]
fn passing_verdict_has_null_hard_timeout() {
    let mut passing = result();
    passing.hard_timeout = None;
    let lines = ReportLine::from_result(&passing, Utc::now());
    let verdict = serde_json::to_value(lines.last().expect("verdict")).expect("serialize");
    assert!(verdict["hard_timeout"].is_null());
}
