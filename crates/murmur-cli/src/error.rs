//! Replay errors.

use std::io;

use murmur_client::{SessionError, TransportError};
use thiserror::Error;

/// Errors from loading or replaying a script.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Script file could not be read.
    #[error("failed to read script: {0}")]
    Io(#[from] io::Error),

    /// Script is not valid JSON or does not match the expected shape.
    #[error("invalid script: {0}")]
    Parse(#[from] serde_json::Error),

    /// A scripted write was refused by the backend.
    #[error("script step {step} failed: {source}")]
    Step {
        /// Zero-based step index.
        step: usize,
        /// Backend error.
        source: TransportError,
    },

    /// The session ended abnormally.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The session task panicked or was cancelled.
    #[error("session task failed: {0}")]
    Join(String),
}
