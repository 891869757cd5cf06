//! Default soft-timeout resolution.
//!
//! Streams that do not configure an explicit soft timeout get one from a
//! [`TimeoutDefaults`] source, queried once when the watcher is built. The
//! source is passed in explicitly so sessions stay reproducible without a
//! live parameter service.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::models::duration_millis;

/// Supplies a default soft timeout per stream id.
pub trait TimeoutDefaults {
    /// Default soft timeout for `stream_id`, or `None` if none is known.
    fn default_soft_timeout(&self, stream_id: &str) -> Option<Duration>;
}

/// Source that never resolves a default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefaults;

impl TimeoutDefaults for NoDefaults {
    fn default_soft_timeout(&self, _stream_id: &str) -> Option<Duration> {
        None
    }
}

/// Nominal publish rates per stream, with an optional global fallback.
///
/// A stream publishing at `rate` Hz gets a soft timeout of one period,
/// `1 / rate` seconds. Streams with no known rate use the fallback.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<String, f64>,
    fallback: Option<Duration>,
}

impl RateTable {
    /// Build a table from nominal rates in Hz.
    #[must_use]
    pub fn new(rates: HashMap<String, f64>) -> Self {
        Self {
            rates,
            fallback: None,
        }
    }

    /// Set the soft timeout used when a stream has no nominal rate.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Option<Duration>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Nominal rate for `stream_id`, if known.
    #[must_use]
    pub fn rate(&self, stream_id: &str) -> Option<f64> {
        self.rates.get(stream_id).copied()
    }
}

impl TimeoutDefaults for RateTable {
    fn default_soft_timeout(&self, stream_id: &str) -> Option<Duration> {
        let from_rate = self
            .rate(stream_id)
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .and_then(|rate| Duration::try_from_secs_f64(1.0 / rate).ok());

        match from_rate {
            Some(period) => {
                debug!(
                    stream_id,
                    period_ms = duration_millis(period),
                    "soft timeout from nominal rate"
                );
                Some(period)
            }
            None => self.fallback,
        }
    }
}
