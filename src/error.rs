//! Error types for the instance lifecycle.
//!
//! Every fallible operation in this crate returns the structured [`Error`]
//! defined here. The taxonomy follows the failure classes of the lifecycle:
//! resource acquisition, process supervision, credential bootstrap, and
//! internal invariant violations.

use std::path::PathBuf;

use crate::server::State;

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No TCP port could be acquired from the operating system.
    #[error("no free port available: {source}")]
    NoPortAvailable {
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied data directory could not be inspected.
    #[error("data directory unreadable: {path:?}: {source}")]
    PathUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database server process failed to launch or become ready.
    #[error("failed to launch server process: {reason}")]
    LaunchFailed { reason: String },

    /// The database server process could not be terminated.
    #[error("failed to kill server process (pid {pid}): {reason}")]
    KillFailed { pid: u32, reason: String },

    /// A driver connection to the instance could not be established.
    #[error("failed to connect to {uri}: {reason}")]
    ConnectFailed { uri: String, reason: String },

    /// A database command was rejected by the server.
    #[error("command failed (code {code}): {message}")]
    CommandFailed { code: i32, message: String },

    /// Credential bootstrap was requested but no driver connector was
    /// supplied at construction.
    #[error("credential bootstrap requested but no driver connector configured")]
    NoConnector,

    /// `start()` was called while an instance is already running.
    #[error("instance is already running; call stop() first")]
    AlreadyRunning,

    /// A connection URI was requested while no instance is running.
    #[error("no instance is running")]
    NotRunning,

    /// A concurrent startup attempt ended in a state other than running.
    #[error("startup attempt ended in unexpected state: {state:?}")]
    StartupFailed { state: State },

    /// Internal invariant violation. Never expected under normal operation.
    #[error("internal consistency error: {0}")]
    Inconsistent(String),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a launch failure error.
    pub fn launch_failed(reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            reason: reason.into(),
        }
    }

    /// Create a connect failure error.
    pub fn connect_failed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Create a command failure error.
    pub fn command_failed(code: i32, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            code,
            message: message.into(),
        }
    }

    /// Create an internal consistency error.
    pub fn inconsistent(detail: impl Into<String>) -> Self {
        Self::Inconsistent(detail.into())
    }

    /// True for errors that indicate a bug in the caller or in this crate
    /// rather than an environmental failure.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::Inconsistent(_))
    }
}
