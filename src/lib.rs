#![forbid(unsafe_code)]

//! Liveness watchdog harness for periodic data feeds.
//!
//! Each monitored stream gets a [`TimeoutWatcher`](watch::TimeoutWatcher)
//! tracking silence against soft and hard thresholds. A
//! [`TestOrchestrator`](orchestrator::TestOrchestrator) runs many watchers as
//! one session and reduces them to a single verdict, which a
//! [`SessionReporter`](report::SessionReporter) appends to a durable record.

pub mod config;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod watch;

pub use config::SessionConfig;
pub use errors::{AppError, Result};
