//! Per-watcher timeout tick task.
//!
//! Each running watcher gets one background task that calls
//! [`check_timeout`](crate::watch::TimeoutWatcher::check_timeout) at a fixed
//! interval. Soft timeouts are logged when a new silence episode opens. A
//! hard timeout cancels the shared tick token, which stops every other
//! watcher's ticks, and notifies the session over an `mpsc` channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use super::sink::WatcherTable;
use crate::models::duration_millis;
use crate::watch::TimeoutEvent;

/// Sent by a ticker when its watcher crosses the hard threshold.
#[derive(Debug, Clone)]
pub(crate) struct HardTimeoutNotice {
    pub(crate) stream_id: String,
    pub(crate) silence: Duration,
}

/// Spawn the tick task for the watcher in `slot`.
pub(crate) fn spawn_ticker(
    table: Arc<WatcherTable>,
    slot: usize,
    tick: Duration,
    ticks: CancellationToken,
    abort_tx: mpsc::Sender<HardTimeoutNotice>,
) -> JoinHandle<()> {
    let span = info_span!("watch_tick", stream_id = %table.stream_id(slot));
    tokio::spawn(run(table, slot, tick, ticks, abort_tx).instrument(span))
}

async fn run(
    table: Arc<WatcherTable>,
    slot: usize,
    tick: Duration,
    ticks: CancellationToken,
    abort_tx: mpsc::Sender<HardTimeoutNotice>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = ticks.cancelled() => {
                debug!("watch ticker cancelled");
                return;
            }
            _ = interval.tick() => {}
        }

        let (event, soft_timeout) = {
            let mut watcher = table.lock(slot);
            (watcher.check_timeout(Instant::now()), watcher.soft_timeout())
        };

        match event {
            TimeoutEvent::NoEvent
            | TimeoutEvent::SoftTimeout {
                new_episode: false, ..
            } => {}
            TimeoutEvent::SoftTimeout {
                silence,
                new_episode: true,
            } => {
                warn!(
                    silence_ms = duration_millis(silence),
                    soft_timeout_ms = duration_millis(soft_timeout),
                    "soft timeout"
                );
            }
            TimeoutEvent::HardTimeout { silence } => {
                let stream_id = table.stream_id(slot).to_owned();
                error!(
                    silence_ms = duration_millis(silence),
                    "hard timeout: stream {stream_id} silent for {} ms",
                    duration_millis(silence)
                );
                ticks.cancel();
                let _ = abort_tx
                    .send(HardTimeoutNotice { stream_id, silence })
                    .await;
                return;
            }
        }
    }
}
