//! Error types for a single container run.
//!
//! Every lifecycle stage has its own variant so the caller can tell a
//! configuration mistake from an engine failure. Signal-induced termination
//! is carried as a distinguished variant holding the intended exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can end a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("another instance is already running (lock held on '{}')", path.display())]
    AlreadyRunning { path: PathBuf },

    #[error("container engine not available: {0}")]
    EngineUnavailable(String),

    #[error("failed to pull image '{reference}': {message}")]
    Pull { reference: String, message: String },

    #[error("could not locate image '{reference}' ({matches} matching images)")]
    ImageResolution { reference: String, matches: usize },

    #[error("failed to create container: {0}")]
    Create(String),

    #[error("failed to start container '{id}': {message}")]
    Start { id: String, message: String },

    #[error("failed to attach to container '{id}': {message}")]
    Attach { id: String, message: String },

    #[error("failed to remove container '{id}': {message}")]
    Remove { id: String, message: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("terminated by {name}")]
    Signal { name: &'static str, exit_code: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Exit code requested by a forwarded OS signal, if this error is one.
    pub fn signal_exit_code(&self) -> Option<i32> {
        match self {
            RunError::Signal { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        RunError::Config(message.into())
    }
}
