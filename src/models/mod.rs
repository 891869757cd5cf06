//! Domain model module declarations.

use std::time::Duration;

pub mod message;
pub mod session;
pub mod snapshot;

pub use message::FeedMessage;
pub use session::{
    HardTimeoutDetail, SessionResult, SessionState, Verdict, EXIT_CANCELLED, EXIT_HARD_TIMEOUT,
    EXIT_PASS,
};
pub use snapshot::{WatcherSnapshot, WatcherState};

/// Convert a duration to whole milliseconds, saturating at `u64::MAX`.
#[must_use]
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
