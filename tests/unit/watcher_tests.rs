//! Unit tests for `TimeoutWatcher` construction, receive path, and timeout
//! checks.
//!
//! All timestamps are synthetic offsets from one base instant, so no
//! runtime or real waiting is involved.

use std::time::Duration;

use tokio::time::Instant;

use endurance_watch::models::{FeedMessage, WatcherState};
use endurance_watch::watch::{
    Inspection, NoDefaults, NoiseDetector, RateTable, TimeoutDefaults, TimeoutEvent,
    TimeoutWatcher, ValidationHook,
};
use endurance_watch::AppError;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn watcher(soft_ms: u64, hard_ms: u64) -> TimeoutWatcher {
    TimeoutWatcher::configure("cam", Some(ms(soft_ms)), ms(hard_ms), None, &NoDefaults)
        .expect("valid watcher")
}

/// Hook that always fails, to prove failures are contained.
struct FailingHook;

impl ValidationHook for FailingHook {
    fn name(&self) -> &str {
        "failing"
    }

    fn inspect(&mut self, _message: &FeedMessage) -> endurance_watch::Result<Inspection> {
        Err(AppError::Hook("decoder exploded".into()))
    }
}

/// Hook that panics on every message.
struct PanickingHook;

impl ValidationHook for PanickingHook {
    fn name(&self) -> &str {
        "panicking"
    }

    fn inspect(&mut self, _message: &FeedMessage) -> endurance_watch::Result<Inspection> {
        panic!("decoder overflow");
    }
}

/// Fixed default source for construction tests.
struct FixedDefault(Duration);

impl TimeoutDefaults for FixedDefault {
    fn default_soft_timeout(&self, _stream_id: &str) -> Option<Duration> {
        Some(self.0)
    }
}

// ── Construction ─────────────────────────────────────────────────────────────

#[test]
fn zero_hard_timeout_is_invalid() {
    let result = TimeoutWatcher::configure("cam", Some(ms(100)), Duration::ZERO, None, &NoDefaults);
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
}

#[test]
fn zero_soft_timeout_is_invalid() {
    let result = TimeoutWatcher::configure("cam", Some(Duration::ZERO), ms(100), None, &NoDefaults);
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
}

#[test]
fn soft_above_hard_is_invalid() {
    let result = TimeoutWatcher::configure("cam", Some(ms(500)), ms(100), None, &NoDefaults);
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
}

#[test]
fn empty_stream_id_is_invalid() {
    let result = TimeoutWatcher::configure("  ", Some(ms(100)), ms(1000), None, &NoDefaults);
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
}

#[test]
fn missing_soft_timeout_without_default_is_config_error() {
    let result = TimeoutWatcher::configure("cam", None, ms(1000), None, &NoDefaults);
    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("cam")),
        "expected Config error naming the stream, got {result:?}"
    );
}

#[test]
fn missing_soft_timeout_resolved_from_defaults() {
    let w = TimeoutWatcher::configure("cam", None, ms(1000), None, &FixedDefault(ms(250)))
        .expect("default resolves");
    assert_eq!(w.soft_timeout(), ms(250));
    assert_eq!(w.hard_timeout(), ms(1000));
}

#[test]
fn soft_timeout_resolved_from_nominal_rate() {
    let rates = RateTable::new([("cam".to_owned(), 10.0)].into_iter().collect());
    let w = TimeoutWatcher::configure("cam", None, ms(30_000), None, &rates).expect("rate resolves");
    assert_eq!(w.soft_timeout(), ms(100));
}

#[test]
fn resolved_default_above_hard_is_invalid() {
    let result = TimeoutWatcher::configure("cam", None, ms(100), None, &FixedDefault(ms(250)));
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
}

#[test]
fn new_watcher_is_idle_with_zero_counters() {
    let snap = watcher(100, 1000).snapshot();
    assert_eq!(snap.state, WatcherState::Idle);
    assert_eq!(snap.message_count, 0);
    assert_eq!(snap.soft_timeout_count, 0);
    assert_eq!(snap.out_of_bounds_count, 0);
    assert!(!snap.hard_timeout_triggered);
    assert_eq!(snap.soft_timeout_ms, 100);
    assert_eq!(snap.hard_timeout_ms, 1000);
}

// ── check_timeout ────────────────────────────────────────────────────────────

#[test]
fn within_soft_threshold_is_no_event_and_mutates_nothing() {
    let t0 = Instant::now();
    let mut w = watcher(100, 1000);
    w.arm(t0);
    w.on_message_received(&FeedMessage::from("a"), t0);
    let before = w.snapshot();

    for offset in [0, 50, 100] {
        assert_eq!(w.check_timeout(t0 + ms(offset)), TimeoutEvent::NoEvent);
    }
    assert_eq!(w.snapshot(), before, "NoEvent checks must not mutate state");
}

#[test]
fn idle_watcher_measures_silence_from_arming() {
    let t0 = Instant::now();
    let mut w = watcher(100, 1000);
    w.arm(t0);
    assert_eq!(w.check_timeout(t0 + ms(100)), TimeoutEvent::NoEvent);
    assert!(matches!(
        w.check_timeout(t0 + ms(101)),
        TimeoutEvent::SoftTimeout { new_episode: true, .. }
    ));
}

#[test]
fn soft_timeout_counts_once_per_silence_episode() {
    let t0 = Instant::now();
    let mut w = watcher(100, 10_000);
    w.arm(t0);
    w.on_message_received(&FeedMessage::from("a"), t0);

    assert_eq!(
        w.check_timeout(t0 + ms(150)),
        TimeoutEvent::SoftTimeout {
            silence: ms(150),
            new_episode: true
        }
    );
    assert_eq!(
        w.check_timeout(t0 + ms(300)),
        TimeoutEvent::SoftTimeout {
            silence: ms(300),
            new_episode: false
        }
    );
    assert_eq!(w.snapshot().soft_timeout_count, 1);
    assert_eq!(w.state(), WatcherState::SoftTimedOut);

    // Next message re-enters Live; a new silence opens a second episode.
    w.on_message_received(&FeedMessage::from("b"), t0 + ms(400));
    assert_eq!(w.state(), WatcherState::Live);
    assert!(matches!(
        w.check_timeout(t0 + ms(600)),
        TimeoutEvent::SoftTimeout { new_episode: true, .. }
    ));
    assert_eq!(w.snapshot().soft_timeout_count, 2);
}

#[test]
fn hard_timeout_is_terminal_and_idempotent() {
    let t0 = Instant::now();
    let mut w = watcher(100, 1000);
    w.arm(t0);

    assert_eq!(
        w.check_timeout(t0 + ms(1500)),
        TimeoutEvent::HardTimeout { silence: ms(1500) }
    );
    assert!(w.is_hard_timed_out());

    // A late message does not resurrect the watcher.
    w.on_message_received(&FeedMessage::from("late"), t0 + ms(1600));
    for later in [1601, 5000, 60_000] {
        assert_eq!(
            w.check_timeout(t0 + ms(later)),
            TimeoutEvent::HardTimeout { silence: ms(1500) }
        );
    }
    let snap = w.snapshot();
    assert!(snap.hard_timeout_triggered);
    assert_eq!(snap.state, WatcherState::HardTimedOut);
    assert_eq!(snap.hard_timeout_silence_ms, Some(1500));
    assert_eq!(snap.message_count, 1);
}

/// Camera scenario: soft 0.1 s, hard 30 s, a message every 50 ms for five
/// seconds (last one at 4.95 s), then silence.
#[test]
fn camera_scenario_soft_then_hard() {
    let t0 = Instant::now();
    let mut w = TimeoutWatcher::configure(
        "/wide_angle_camera_front/image_color",
        Some(ms(100)),
        Duration::from_secs(30),
        Some(Box::new(NoiseDetector::default())),
        &NoDefaults,
    )
    .expect("valid watcher");
    w.arm(t0);

    let mut last = t0;
    for i in 0..100u64 {
        last = t0 + ms(i * 50);
        let mut payload = i.to_le_bytes().to_vec();
        payload.resize(128, 0xAB);
        w.on_message_received(&FeedMessage::new(payload), last);
        assert_eq!(w.check_timeout(last + ms(10)), TimeoutEvent::NoEvent);
    }
    assert_eq!(last, t0 + ms(4950));

    assert!(matches!(
        w.check_timeout(t0 + ms(5150)),
        TimeoutEvent::SoftTimeout { new_episode: true, .. }
    ));
    assert!(matches!(
        w.check_timeout(t0 + Duration::from_secs(35)),
        TimeoutEvent::HardTimeout { .. }
    ));

    let snap = w.snapshot();
    assert_eq!(snap.message_count, 100);
    assert_eq!(snap.soft_timeout_count, 1);
    assert_eq!(snap.out_of_bounds_count, 0);
    assert!(snap.hard_timeout_triggered);
    assert_eq!(snap.longest_gap_ms, 50);
}

// ── on_message_received ──────────────────────────────────────────────────────

#[test]
fn identical_arrival_times_are_both_counted() {
    let t0 = Instant::now();
    let mut w = watcher(100, 1000);
    w.arm(t0);
    w.on_message_received(&FeedMessage::from("a"), t0 + ms(10));
    w.on_message_received(&FeedMessage::from("b"), t0 + ms(10));
    assert_eq!(w.snapshot().message_count, 2);
}

#[test]
fn reordered_delivery_does_not_rewind_clock() {
    let t0 = Instant::now();
    let mut w = watcher(100, 1000);
    w.arm(t0);
    w.on_message_received(&FeedMessage::from("new"), t0 + ms(500));
    w.on_message_received(&FeedMessage::from("old"), t0 + ms(200));

    assert_eq!(w.snapshot().message_count, 2);
    // Silence still measured from the newest arrival.
    assert_eq!(w.check_timeout(t0 + ms(590)), TimeoutEvent::NoEvent);
}

#[test]
fn longest_gap_tracks_largest_silence() {
    let t0 = Instant::now();
    let mut w = watcher(100, 10_000);
    w.arm(t0);
    for at in [10, 60, 400, 450] {
        w.on_message_received(&FeedMessage::from("x"), t0 + ms(at));
    }
    assert_eq!(w.snapshot().longest_gap_ms, 340);
}

#[test]
fn hook_anomaly_increments_out_of_bounds() {
    let t0 = Instant::now();
    let mut w = TimeoutWatcher::configure(
        "cam",
        Some(ms(100)),
        ms(1000),
        Some(Box::new(NoiseDetector::default())),
        &NoDefaults,
    )
    .expect("valid watcher");
    w.arm(t0);

    let frame = vec![7u8; 200];
    w.on_message_received(&FeedMessage::new(frame.clone()), t0 + ms(10));
    w.on_message_received(&FeedMessage::new(frame), t0 + ms(20));

    let snap = w.snapshot();
    assert_eq!(snap.out_of_bounds_count, 1);
    assert_eq!(snap.message_count, 2);
    assert_eq!(snap.hook.as_deref(), Some("noise"));
}

#[test]
fn hook_error_is_counted_and_contained() {
    let t0 = Instant::now();
    let mut w = TimeoutWatcher::configure(
        "cam",
        Some(ms(100)),
        ms(1000),
        Some(Box::new(FailingHook)),
        &NoDefaults,
    )
    .expect("valid watcher");
    w.arm(t0);

    w.on_message_received(&FeedMessage::from("a"), t0 + ms(10));
    w.on_message_received(&FeedMessage::from("b"), t0 + ms(20));

    let snap = w.snapshot();
    assert_eq!(snap.out_of_bounds_count, 2);
    assert_eq!(snap.message_count, 2);
    assert_eq!(snap.state, WatcherState::Live);
    assert_eq!(w.check_timeout(t0 + ms(50)), TimeoutEvent::NoEvent);
}

#[test]
fn hook_panic_is_counted_and_contained() {
    let t0 = Instant::now();
    let mut w = TimeoutWatcher::configure(
        "cam",
        Some(ms(100)),
        ms(1000),
        Some(Box::new(PanickingHook)),
        &NoDefaults,
    )
    .expect("valid watcher");
    w.arm(t0);

    w.on_message_received(&FeedMessage::from("a"), t0 + ms(10));
    w.on_message_received(&FeedMessage::from("b"), t0 + ms(20));

    let snap = w.snapshot();
    assert_eq!(snap.message_count, 2);
    assert_eq!(snap.out_of_bounds_count, 2);
    assert_eq!(snap.state, WatcherState::Live);
    assert_eq!(w.check_timeout(t0 + ms(50)), TimeoutEvent::NoEvent);
}

#[test]
fn snapshot_never_mutates() {
    let t0 = Instant::now();
    let mut w = watcher(100, 1000);
    w.arm(t0);
    w.on_message_received(&FeedMessage::from("a"), t0);
    let first = w.snapshot();
    let second = w.snapshot();
    assert_eq!(first, second);
}
