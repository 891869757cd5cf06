//! Session file parsing, validation, and orchestrator construction.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::orchestrator::TestOrchestrator;
use crate::watch::{HookConfig, RateTable, TimeoutWatcher};
use crate::{AppError, Result};

fn default_true() -> bool {
    true
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(".endurance-watch").join("reports")
}

fn default_ipc_name() -> String {
    "endurance-watch".into()
}

/// One monitored stream as written in the session file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Stream identifier (for example a topic name).
    pub id: String,
    /// Whether the stream is monitored in this session.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Soft silence threshold; resolved from `[rates]` or the global default
    /// when omitted.
    #[serde(default)]
    pub soft_timeout_seconds: Option<f64>,
    /// Hard silence threshold.
    pub hard_timeout_seconds: f64,
    /// Optional per-message validation hook.
    #[serde(default)]
    pub hook: Option<HookConfig>,
}

/// Session configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Name recorded in reports.
    pub session_name: String,
    /// Session length; unbounded when omitted.
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Fixed tick interval; a tenth of the smallest soft timeout when omitted.
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
    /// Directory receiving the append-only session reports.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// Local socket name of the feed server.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Soft timeout for streams with neither an explicit value nor a rate.
    #[serde(default)]
    pub default_soft_timeout_seconds: Option<f64>,
    /// Nominal publish rate (Hz) per stream id.
    #[serde(default)]
    pub rates: HashMap<String, f64>,
    /// Monitored streams, in registration order.
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

impl SessionConfig {
    /// Load and validate a session file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a session file from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Session length, if bounded.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds.and_then(seconds)
    }

    /// Configured tick interval, if fixed.
    #[must_use]
    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms.map(Duration::from_millis)
    }

    /// Default soft-timeout source built from `[rates]` and the global
    /// fallback.
    #[must_use]
    pub fn rate_table(&self) -> RateTable {
        RateTable::new(self.rates.clone())
            .with_fallback(self.default_soft_timeout_seconds.and_then(seconds))
    }

    /// Streams that will be monitored.
    pub fn enabled_streams(&self) -> impl Iterator<Item = &StreamConfig> {
        self.streams.iter().filter(|s| s.enabled)
    }

    /// Configure and register a watcher for every enabled stream.
    ///
    /// # Errors
    ///
    /// Propagates the first watcher construction or registration error
    /// (`InvalidArgument`, `Config`, or `DuplicateStreamId`).
    pub fn build_orchestrator(&self) -> Result<TestOrchestrator> {
        let defaults = self.rate_table();
        let mut orchestrator = TestOrchestrator::new(self.session_name.clone());
        if let Some(tick) = self.tick_interval() {
            orchestrator = orchestrator.with_tick_interval(tick);
        }

        for stream in self.streams.iter().filter(|s| !s.enabled) {
            info!(stream_id = %stream.id, "stream disabled, skipping");
        }

        for stream in self.enabled_streams() {
            let hook = stream.hook.as_ref().map(HookConfig::build).transpose()?;
            let soft = match stream.soft_timeout_seconds {
                Some(value) => Some(threshold(&stream.id, "soft", value)?),
                None => None,
            };
            let hard = threshold(&stream.id, "hard", stream.hard_timeout_seconds)?;
            let watcher = TimeoutWatcher::configure(stream.id.clone(), soft, hard, hook, &defaults)?;
            orchestrator.register(watcher)?;
        }

        Ok(orchestrator)
    }

    fn validate(&self) -> Result<()> {
        if self.session_name.trim().is_empty() {
            return Err(AppError::Config("session_name must not be empty".into()));
        }

        if let Some(duration) = self.duration_seconds {
            if !(duration.is_finite() && duration > 0.0) {
                return Err(AppError::Config(
                    "duration_seconds must be greater than zero".into(),
                ));
            }
        }

        if self.tick_interval_ms == Some(0) {
            return Err(AppError::Config(
                "tick_interval_ms must be greater than zero".into(),
            ));
        }

        if let Some(default) = self.default_soft_timeout_seconds {
            if !(default.is_finite() && default > 0.0) {
                return Err(AppError::Config(
                    "default_soft_timeout_seconds must be greater than zero".into(),
                ));
            }
        }

        if let Some((id, _)) = self
            .rates
            .iter()
            .find(|(_, rate)| !(rate.is_finite() && **rate > 0.0))
        {
            return Err(AppError::Config(format!(
                "rate for {id} must be greater than zero"
            )));
        }

        let mut seen = HashSet::new();
        for stream in &self.streams {
            if stream.id.trim().is_empty() {
                return Err(AppError::Config("stream id must not be empty".into()));
            }
            if !seen.insert(stream.id.as_str()) {
                return Err(AppError::Config(format!(
                    "stream {} is listed more than once",
                    stream.id
                )));
            }
            if !is_positive(stream.hard_timeout_seconds) {
                return Err(AppError::Config(format!(
                    "hard_timeout_seconds for {} must be greater than zero",
                    stream.id
                )));
            }
            if stream.soft_timeout_seconds.is_some_and(|soft| !is_positive(soft)) {
                return Err(AppError::Config(format!(
                    "soft_timeout_seconds for {} must be greater than zero",
                    stream.id
                )));
            }
        }

        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Convert seconds to a duration; `None` for non-finite or negative input.
fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

fn threshold(stream_id: &str, kind: &str, value: f64) -> Result<Duration> {
    seconds(value).ok_or_else(|| {
        AppError::InvalidArgument(format!(
            "{kind} timeout for {stream_id} must be a finite, non-negative number of seconds"
        ))
    })
}
