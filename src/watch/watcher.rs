//! Per-stream timeout watchdog.
//!
//! A [`TimeoutWatcher`] tracks how long its stream has been silent and
//! compares that silence against a soft threshold (suspicious, counted) and
//! a hard threshold (fatal, terminal). Every received message is handed to
//! an optional [`ValidationHook`].
//!
//! The watcher itself is a plain state machine driven by explicit
//! timestamps. Scheduling and locking live in the orchestrator.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use super::defaults::TimeoutDefaults;
use super::hook::{Inspection, ValidationHook};
use crate::models::{duration_millis, FeedMessage, WatcherSnapshot, WatcherState};
use crate::{AppError, Result};

/// Outcome of a single timeout check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    /// Stream is within its soft threshold.
    NoEvent,
    /// Stream is silent past its soft threshold.
    SoftTimeout {
        /// Silence at the time of the check.
        silence: Duration,
        /// Whether this check opened a new silence episode (and was counted).
        new_episode: bool,
    },
    /// Stream is silent past its hard threshold. Terminal.
    HardTimeout {
        /// Silence measured when the threshold tripped.
        silence: Duration,
    },
}

/// Liveness state machine for one named stream.
pub struct TimeoutWatcher {
    stream_id: String,
    soft_timeout: Duration,
    hard_timeout: Duration,
    hook: Option<Box<dyn ValidationHook>>,
    last_message_time: Instant,
    message_count: u64,
    soft_timeout_count: u64,
    out_of_bounds_count: u64,
    hard_timeout_triggered: bool,
    hard_timeout_silence: Option<Duration>,
    longest_gap: Duration,
    state: WatcherState,
}

impl fmt::Debug for TimeoutWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutWatcher")
            .field("stream_id", &self.stream_id)
            .field("soft_timeout", &self.soft_timeout)
            .field("hard_timeout", &self.hard_timeout)
            .field("hook", &self.hook.as_ref().map(|h| h.name().to_owned()))
            .field("message_count", &self.message_count)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TimeoutWatcher {
    /// Construct a watcher for `stream_id`.
    ///
    /// When `soft_timeout` is `None` it is resolved once from `defaults`.
    /// Silence is measured from construction until [`arm`](Self::arm) or the
    /// first message.
    ///
    /// # Errors
    ///
    /// * [`AppError::InvalidArgument`] if the id is empty, a threshold is
    ///   zero, or the soft threshold exceeds the hard one.
    /// * [`AppError::Config`] if no soft timeout was given and `defaults`
    ///   cannot supply one.
    pub fn configure(
        stream_id: impl Into<String>,
        soft_timeout: Option<Duration>,
        hard_timeout: Duration,
        hook: Option<Box<dyn ValidationHook>>,
        defaults: &dyn TimeoutDefaults,
    ) -> Result<Self> {
        let stream_id = stream_id.into();
        if stream_id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "stream id must not be empty".into(),
            ));
        }
        if hard_timeout.is_zero() {
            return Err(AppError::InvalidArgument(format!(
                "hard timeout for {stream_id} must be greater than zero"
            )));
        }
        if soft_timeout.is_some_and(|soft| soft.is_zero()) {
            return Err(AppError::InvalidArgument(format!(
                "soft timeout for {stream_id} must be greater than zero"
            )));
        }

        let soft_timeout = match soft_timeout {
            Some(soft) => soft,
            None => defaults.default_soft_timeout(&stream_id).ok_or_else(|| {
                AppError::Config(format!(
                    "no soft timeout configured for {stream_id} and no default is resolvable"
                ))
            })?,
        };

        if soft_timeout > hard_timeout {
            return Err(AppError::InvalidArgument(format!(
                "soft timeout ({} ms) exceeds hard timeout ({} ms) for {stream_id}",
                duration_millis(soft_timeout),
                duration_millis(hard_timeout)
            )));
        }

        Ok(Self {
            stream_id,
            soft_timeout,
            hard_timeout,
            hook,
            last_message_time: Instant::now(),
            message_count: 0,
            soft_timeout_count: 0,
            out_of_bounds_count: 0,
            hard_timeout_triggered: false,
            hard_timeout_silence: None,
            longest_gap: Duration::ZERO,
            state: WatcherState::Idle,
        })
    }

    /// Restart the silence clock at `now` if no message has arrived yet.
    pub fn arm(&mut self, now: Instant) {
        if self.state == WatcherState::Idle {
            self.last_message_time = now;
        }
    }

    /// Record a message arriving at `arrival` and run the validation hook.
    ///
    /// Hook anomalies and hook failures (including a panicking hook) are
    /// counted as out of bounds and logged; they never propagate.
    pub fn on_message_received(&mut self, message: &FeedMessage, arrival: Instant) {
        let gap = arrival.saturating_duration_since(self.last_message_time);
        self.longest_gap = self.longest_gap.max(gap);
        // Reordered deliveries are counted but never rewind the clock.
        if arrival > self.last_message_time {
            self.last_message_time = arrival;
        }
        self.message_count = self.message_count.saturating_add(1);
        match self.state {
            WatcherState::HardTimedOut => {}
            WatcherState::SoftTimedOut => {
                info!(
                    stream_id = %self.stream_id,
                    silence_ms = duration_millis(gap),
                    "stream recovered after soft timeout"
                );
                self.state = WatcherState::Live;
            }
            WatcherState::Idle | WatcherState::Live => self.state = WatcherState::Live,
        }

        let Some(hook) = self.hook.as_mut() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook.inspect(message)))
            .unwrap_or_else(|payload| Err(AppError::Hook(panic_reason(payload.as_ref()))));
        match outcome {
            Ok(Inspection::Valid) => {}
            Ok(Inspection::Anomaly(reason)) => {
                self.out_of_bounds_count = self.out_of_bounds_count.saturating_add(1);
                warn!(
                    stream_id = %self.stream_id,
                    hook = hook.name(),
                    %reason,
                    "message out of bounds"
                );
            }
            Err(err) => {
                self.out_of_bounds_count = self.out_of_bounds_count.saturating_add(1);
                error!(
                    stream_id = %self.stream_id,
                    hook = hook.name(),
                    %err,
                    "validation hook failed"
                );
            }
        }
    }

    /// Compare the silence at `now` against both thresholds.
    ///
    /// A soft timeout is counted once per silence episode. Once the hard
    /// threshold has been crossed every later check reports the same
    /// [`TimeoutEvent::HardTimeout`].
    pub fn check_timeout(&mut self, now: Instant) -> TimeoutEvent {
        if self.hard_timeout_triggered {
            return TimeoutEvent::HardTimeout {
                silence: self.hard_timeout_silence.unwrap_or(self.hard_timeout),
            };
        }

        let silence = now.saturating_duration_since(self.last_message_time);

        if silence > self.hard_timeout {
            self.hard_timeout_triggered = true;
            self.hard_timeout_silence = Some(silence);
            self.state = WatcherState::HardTimedOut;
            return TimeoutEvent::HardTimeout { silence };
        }

        if silence > self.soft_timeout {
            let new_episode = self.state != WatcherState::SoftTimedOut;
            if new_episode {
                self.soft_timeout_count = self.soft_timeout_count.saturating_add(1);
                self.state = WatcherState::SoftTimedOut;
            }
            return TimeoutEvent::SoftTimeout {
                silence,
                new_episode,
            };
        }

        TimeoutEvent::NoEvent
    }

    /// Immutable copy of the watcher's counters and state.
    #[must_use]
    pub fn snapshot(&self) -> WatcherSnapshot {
        WatcherSnapshot {
            stream_id: self.stream_id.clone(),
            soft_timeout_ms: duration_millis(self.soft_timeout),
            hard_timeout_ms: duration_millis(self.hard_timeout),
            message_count: self.message_count,
            soft_timeout_count: self.soft_timeout_count,
            out_of_bounds_count: self.out_of_bounds_count,
            hard_timeout_triggered: self.hard_timeout_triggered,
            hard_timeout_silence_ms: self.hard_timeout_silence.map(duration_millis),
            longest_gap_ms: duration_millis(self.longest_gap),
            hook: self.hook.as_ref().map(|h| h.name().to_owned()),
            state: self.state,
        }
    }

    /// Monitored stream identifier.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Resolved soft threshold.
    #[must_use]
    pub fn soft_timeout(&self) -> Duration {
        self.soft_timeout
    }

    /// Hard threshold.
    #[must_use]
    pub fn hard_timeout(&self) -> Duration {
        self.hard_timeout
    }

    /// Current liveness state.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Whether the hard threshold has been crossed.
    #[must_use]
    pub fn is_hard_timed_out(&self) -> bool {
        self.hard_timeout_triggered
    }
}

/// Message carried by a caught hook panic.
fn panic_reason(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    format!("hook panicked: {detail}")
}
