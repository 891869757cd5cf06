//! Multi-watcher test session.
//!
//! A [`TestOrchestrator`] collects watchers while `Idle`, then
//! [`start`](TestOrchestrator::start)s them as one session. The returned
//! [`SessionRun`] resolves when the first of three things happens: a watcher
//! crosses its hard threshold, the caller's cancellation token fires, or the
//! session duration expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::sink::{FeedSink, SessionShared, WatcherTable};
use super::ticker::{spawn_ticker, HardTimeoutNotice};
use crate::models::{
    duration_millis, HardTimeoutDetail, SessionResult, SessionState, Verdict, WatcherSnapshot,
};
use crate::watch::TimeoutWatcher;
use crate::{AppError, Result};

/// Shortest tick interval derived from soft timeouts.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Ticks per soft-timeout period when no interval is configured.
const TICKS_PER_SOFT_TIMEOUT: u32 = 10;

/// Owns a set of watchers and runs them as one session.
#[derive(Debug)]
pub struct TestOrchestrator {
    session_id: String,
    session_name: String,
    pending: Vec<TimeoutWatcher>,
    tick_interval: Option<Duration>,
    shared: Arc<SessionShared>,
}

impl TestOrchestrator {
    /// Create an idle session with no watchers.
    #[must_use]
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            session_name: session_name.into(),
            pending: Vec::new(),
            tick_interval: None,
            shared: Arc::new(SessionShared::new()),
        }
    }

    /// Use a fixed tick interval instead of one derived from soft timeouts.
    #[must_use]
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = Some(tick.max(MIN_TICK_INTERVAL));
        self
    }

    /// Append a watcher to the session.
    ///
    /// # Errors
    ///
    /// * [`AppError::DuplicateStreamId`] if the stream is already registered;
    ///   the earlier registration is kept.
    /// * [`AppError::SessionState`] if the session has already started.
    pub fn register(&mut self, watcher: TimeoutWatcher) -> Result<()> {
        let state = self.shared.state();
        if state != SessionState::Idle {
            return Err(AppError::SessionState(format!(
                "cannot register {} while session is {state:?}",
                watcher.stream_id()
            )));
        }
        if self
            .pending
            .iter()
            .any(|w| w.stream_id() == watcher.stream_id())
        {
            return Err(AppError::DuplicateStreamId(watcher.stream_id().to_owned()));
        }
        info!(
            stream_id = watcher.stream_id(),
            soft_timeout_ms = duration_millis(watcher.soft_timeout()),
            hard_timeout_ms = duration_millis(watcher.hard_timeout()),
            "watcher registered"
        );
        self.pending.push(watcher);
        Ok(())
    }

    /// Handle for delivering messages to this session's watchers.
    #[must_use]
    pub fn sink(&self) -> FeedSink {
        FeedSink::new(Arc::clone(&self.shared))
    }

    /// Unique session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Session name.
    #[must_use]
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Registered stream ids in registration order.
    #[must_use]
    pub fn stream_ids(&self) -> Vec<String> {
        match self.shared.table.get() {
            Some(table) => (0..table.len())
                .map(|slot| table.stream_id(slot).to_owned())
                .collect(),
            None => self
                .pending
                .iter()
                .map(|w| w.stream_id().to_owned())
                .collect(),
        }
    }

    /// Current snapshots of every watcher in registration order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<WatcherSnapshot> {
        match self.shared.table.get() {
            Some(table) => table.snapshots(),
            None => self.pending.iter().map(TimeoutWatcher::snapshot).collect(),
        }
    }

    /// Tick interval for the registered watchers, or `None` if there are
    /// none left to start.
    ///
    /// Defaults to a tenth of the smallest soft timeout.
    #[must_use]
    pub fn tick_interval(&self) -> Option<Duration> {
        if self.pending.is_empty() {
            return None;
        }
        self.tick_interval.or_else(|| {
            self.pending
                .iter()
                .map(TimeoutWatcher::soft_timeout)
                .min()
                .map(|soft| (soft / TICKS_PER_SOFT_TIMEOUT).max(MIN_TICK_INTERVAL))
        })
    }

    /// Arm every watcher and start ticking. Must be called inside a tokio
    /// runtime.
    ///
    /// With `duration` set the session completes normally when it expires;
    /// without it the session runs until a hard timeout or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionState`] if the session was already started.
    pub fn start(
        &mut self,
        duration: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<SessionRun> {
        let tick = self.tick_interval();
        self.shared.transition(SessionState::Running)?;

        let started = Instant::now();
        let started_at = Utc::now();
        let mut watchers = std::mem::take(&mut self.pending);
        for watcher in &mut watchers {
            watcher.arm(started);
        }

        let table = Arc::new(WatcherTable::new(watchers));
        self.shared
            .table
            .set(Arc::clone(&table))
            .map_err(|_| AppError::SessionState("watcher table already frozen".into()))?;

        let ticks = CancellationToken::new();
        let (abort_tx, abort_rx) = mpsc::channel(table.len().max(1));
        let mut tasks = Vec::with_capacity(table.len());
        if let Some(tick) = tick {
            for slot in 0..table.len() {
                tasks.push(spawn_ticker(
                    Arc::clone(&table),
                    slot,
                    tick,
                    ticks.clone(),
                    abort_tx.clone(),
                ));
            }
        }
        drop(abort_tx);

        info!(
            session_id = %self.session_id,
            session_name = %self.session_name,
            watchers = table.len(),
            tick_ms = tick.map(duration_millis),
            duration_ms = duration.map(duration_millis),
            "session started"
        );

        Ok(SessionRun {
            session_id: self.session_id.clone(),
            session_name: self.session_name.clone(),
            shared: Arc::clone(&self.shared),
            table,
            duration,
            cancel,
            ticks,
            abort_rx,
            tasks,
            started,
            started_at,
        })
    }

    /// Run the whole session: [`start`](Self::start) then
    /// [`SessionRun::wait`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionState`] if the session was already started.
    pub async fn run(
        &mut self,
        duration: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<SessionResult> {
        let run = self.start(duration, cancel)?;
        Ok(run.wait().await)
    }
}

/// Why a session stopped.
enum SessionEnd {
    HardTimeout(HardTimeoutNotice),
    Cancelled,
    Completed,
}

/// A started session. Dropping it stops all watcher ticks.
#[derive(Debug)]
pub struct SessionRun {
    session_id: String,
    session_name: String,
    shared: Arc<SessionShared>,
    table: Arc<WatcherTable>,
    duration: Option<Duration>,
    cancel: CancellationToken,
    ticks: CancellationToken,
    abort_rx: mpsc::Receiver<HardTimeoutNotice>,
    tasks: Vec<JoinHandle<()>>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Drop for SessionRun {
    fn drop(&mut self) {
        self.ticks.cancel();
    }
}

impl SessionRun {
    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Token that aborts the session as an operator cancel.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Suspend until the session ends and return its result.
    pub async fn wait(mut self) -> SessionResult {
        let span = info_span!(
            "session",
            session_id = %self.session_id,
            session_name = %self.session_name
        );
        async move {
            let deadline = self.duration.and_then(|d| self.started.checked_add(d));
            let end = tokio::select! {
                biased;
                Some(notice) = self.abort_rx.recv() => SessionEnd::HardTimeout(notice),
                () = self.cancel.cancelled() => SessionEnd::Cancelled,
                () = sleep_until_deadline(deadline) => SessionEnd::Completed,
            };

            self.ticks.cancel();
            for task in self.tasks.drain(..) {
                if let Err(err) = task.await {
                    warn!(%err, "watch ticker task failed");
                }
            }

            let elapsed = Instant::now().saturating_duration_since(self.started);
            let watchers = self.table.snapshots();
            let verdict = Verdict::from_snapshots(&watchers);

            let (state, hard_timeout) = match end {
                SessionEnd::HardTimeout(notice) => (
                    SessionState::AbortedOnHardTimeout,
                    Some(HardTimeoutDetail {
                        stream_id: notice.stream_id,
                        silence_ms: duration_millis(notice.silence),
                    }),
                ),
                SessionEnd::Cancelled => (SessionState::Cancelled, first_hard_timeout(&watchers)),
                SessionEnd::Completed => (SessionState::Completed, first_hard_timeout(&watchers)),
            };
            if let Err(err) = self.shared.transition(state) {
                error!(%err, "failed to record session end");
            }

            match &hard_timeout {
                Some(detail) => error!(
                    stream_id = %detail.stream_id,
                    silence_ms = detail.silence_ms,
                    ?state,
                    ?verdict,
                    "session aborted: stream {} silent for {} ms",
                    detail.stream_id,
                    detail.silence_ms
                ),
                None => info!(
                    ?state,
                    ?verdict,
                    elapsed_ms = duration_millis(elapsed),
                    "session ended"
                ),
            }

            SessionResult {
                session_id: self.session_id.clone(),
                session_name: self.session_name.clone(),
                started_at: self.started_at,
                ended_at: Utc::now(),
                elapsed_ms: duration_millis(elapsed),
                state,
                verdict,
                hard_timeout,
                watchers,
            }
        }
        .instrument(span)
        .await
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn first_hard_timeout(watchers: &[WatcherSnapshot]) -> Option<HardTimeoutDetail> {
    watchers
        .iter()
        .find(|w| w.hard_timeout_triggered)
        .map(|w| HardTimeoutDetail {
            stream_id: w.stream_id.clone(),
            silence_ms: w.hard_timeout_silence_ms.unwrap_or(w.hard_timeout_ms),
        })
}
