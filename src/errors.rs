//! Error types shared across the harness.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all construction-time and I/O
/// failure modes.
///
/// Soft and hard timeouts are not errors: they surface as
/// [`TimeoutEvent`](crate::watch::watcher::TimeoutEvent)s and in the
/// [`SessionResult`](crate::models::session::SessionResult).
#[derive(Debug)]
pub enum AppError {
    /// Session file parsing or validation failure, or no resolvable default
    /// soft timeout for a stream.
    Config(String),
    /// Malformed thresholds or identifiers passed to a constructor.
    InvalidArgument(String),
    /// A stream id was registered twice in one session.
    DuplicateStreamId(String),
    /// Operation is not legal in the session's current lifecycle state.
    SessionState(String),
    /// Requested stream does not exist in the session.
    NotFound(String),
    /// A validation hook failed internally.
    Hook(String),
    /// Local feed socket failure.
    Ipc(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::DuplicateStreamId(id) => write!(f, "duplicate stream id: {id}"),
            Self::SessionState(msg) => write!(f, "session state: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Hook(msg) => write!(f, "hook: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid session file: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
