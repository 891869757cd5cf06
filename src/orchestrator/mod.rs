//! Session orchestration.
//!
//! Covers watcher registration, the per-watcher tick tasks, message
//! delivery from the transport, and verdict aggregation.

pub mod sink;
pub mod test_orchestrator;
mod ticker;

pub use sink::FeedSink;
pub use test_orchestrator::{SessionRun, TestOrchestrator, MIN_TICK_INTERVAL};
