//! Error types for media fetches and session configuration.

use std::time::Duration;

use thiserror::Error;

/// Errors from fetching a remote media object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Fetch did not complete within the configured timeout.
    #[error("media fetch timed out after {elapsed:?}")]
    Timeout {
        /// How long we waited.
        elapsed: Duration,
    },

    /// No object exists at the URL.
    #[error("media object not found: {url}")]
    NotFound {
        /// Requested URL.
        url: String,
    },

    /// Blob store or network failure.
    #[error("blob store error: {0}")]
    Storage(String),
}

impl FetchError {
    /// Returns true if this error may succeed on retry.
    ///
    /// A missing object will stay missing; timeouts and storage hiccups may
    /// not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Storage(_))
    }
}

/// Invalid session configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Theme name not recognised.
    #[error("unknown theme: {0}")]
    UnknownTheme(String),
}
