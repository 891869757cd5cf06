//! Local feed transport.
//!
//! Provides a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! server through which publishers deliver stream messages into a running
//! session, and through which `endurance-watch-ctl` queries or aborts it.

pub mod codec;
pub mod server;
