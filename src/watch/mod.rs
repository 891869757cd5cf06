//! Stream liveness primitives.
//!
//! Covers the per-stream timeout watchdog, the validation hooks it runs on
//! every message, and default soft-timeout resolution.

pub mod defaults;
pub mod hook;
pub mod watcher;

pub use defaults::{NoDefaults, RateTable, TimeoutDefaults};
pub use hook::{HookConfig, Inspection, NoiseDetector, ValidationHook};
pub use watcher::{TimeoutEvent, TimeoutWatcher};
