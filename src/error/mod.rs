//! Error types and Result aliases for dirwatch.
//!
//! Setup failures (configuration, subscription) surface as [`Error`] and end
//! the process. Per-event failures are [`DispatchError`] values that the
//! dispatcher logs and swallows.

use thiserror::Error;

/// Result type alias using dirwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dirwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Event dispatch error.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// File watcher errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// The notification backend reported an error after startup.
    #[error("subscription error: {0}")]
    Subscription(String),
}

/// Errors that abort the dispatch of a single event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Malformed filename pattern.
    #[error("invalid glob pattern '{pattern}': {reason}")]
    Glob { pattern: String, reason: String },

    /// Template could not be parsed or referenced an undefined value.
    #[error("failed to render command: {0}")]
    Render(String),

    /// The shell could not be started.
    #[error("failed to spawn '{shell}': {reason}")]
    Spawn { shell: String, reason: String },

    /// The command exited with a failure status.
    #[error("command '{command}' exited with status {code}")]
    NonZeroExit { command: String, code: i32 },

    /// The command was terminated by a signal.
    #[error("command '{command}' was terminated by a signal")]
    Signaled { command: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Internal(format!("failed to encode configuration: {err}"))
    }
}

impl DispatchError {
    /// Create a render error.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}
