//! Per-watcher validation hooks.
//!
//! A [`ValidationHook`] is invoked synchronously on every message a watcher
//! receives. It may keep state across calls (for example the previous
//! sample) but that state belongs to exactly one watcher. Hooks know nothing
//! about timeouts.

use serde::Deserialize;
use tracing::debug;

use crate::models::FeedMessage;
use crate::{AppError, Result};

/// Number of leading payload bytes sampled by [`NoiseDetector`] by default.
pub const DEFAULT_NOISE_SAMPLE_BYTES: usize = 100;

/// Outcome of inspecting one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// Message looks healthy.
    Valid,
    /// Message is out of bounds; the string describes why.
    Anomaly(String),
}

/// Stream-specific check run on every received message.
///
/// Implementations must return promptly: they run while the watcher's
/// state is locked.
pub trait ValidationHook: Send {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Inspect a received message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Hook`] if the hook itself fails. The watcher
    /// counts the failure as out of bounds and keeps monitoring.
    fn inspect(&mut self, message: &FeedMessage) -> Result<Inspection>;
}

/// Detects frozen or duplicated frames by comparing leading payload bytes.
///
/// A live sensor always carries some noise, so two consecutive payloads
/// whose first `sample_bytes` bytes match exactly indicate a stuck source.
/// Payloads shorter than the window are compared in full.
#[derive(Debug)]
pub struct NoiseDetector {
    sample_bytes: usize,
    previous: Option<Vec<u8>>,
}

impl NoiseDetector {
    /// Construct a detector sampling the first `sample_bytes` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidArgument`] if `sample_bytes` is zero.
    pub fn new(sample_bytes: usize) -> Result<Self> {
        if sample_bytes == 0 {
            return Err(AppError::InvalidArgument(
                "noise sample window must be at least one byte".into(),
            ));
        }
        Ok(Self {
            sample_bytes,
            previous: None,
        })
    }

    /// Size of the comparison window.
    #[must_use]
    pub fn sample_bytes(&self) -> usize {
        self.sample_bytes
    }
}

impl Default for NoiseDetector {
    fn default() -> Self {
        Self {
            sample_bytes: DEFAULT_NOISE_SAMPLE_BYTES,
            previous: None,
        }
    }
}

impl ValidationHook for NoiseDetector {
    fn name(&self) -> &str {
        "noise"
    }

    fn inspect(&mut self, message: &FeedMessage) -> Result<Inspection> {
        let window = message.payload.len().min(self.sample_bytes);
        let sample = message.payload[..window].to_vec();

        let outcome = match self.previous.as_deref() {
            Some(previous) if previous == sample.as_slice() => Inspection::Anomaly(format!(
                "no noise detected: first {window} bytes identical to previous message"
            )),
            _ => Inspection::Valid,
        };

        debug!(window, "noise sample retained");
        self.previous = Some(sample);
        Ok(outcome)
    }
}

/// Hook selection as written in a session file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookConfig {
    /// Frozen-frame detector.
    Noise {
        /// Leading bytes compared between consecutive messages.
        #[serde(default = "default_sample_bytes")]
        sample_bytes: usize,
    },
}

fn default_sample_bytes() -> usize {
    DEFAULT_NOISE_SAMPLE_BYTES
}

impl HookConfig {
    /// Build a fresh hook instance. Each watcher gets its own.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidArgument`] if the hook parameters are invalid.
    pub fn build(&self) -> Result<Box<dyn ValidationHook>> {
        match self {
            Self::Noise { sample_bytes } => Ok(Box::new(NoiseDetector::new(*sample_bytes)?)),
        }
    }
}
