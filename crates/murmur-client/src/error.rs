//! Client error types.

use murmur_proto::{ChannelId, EventKey, ProtocolError};
use thiserror::Error;

/// Errors reported by backend implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection to the backend is gone.
    #[error("backend connection closed")]
    Closed,

    /// Channel does not exist.
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),

    /// Update targeted an event that does not exist.
    #[error("unknown event {key} in channel {channel}")]
    UnknownEvent {
        /// Channel searched.
        channel: ChannelId,
        /// Missing key.
        key: EventKey,
    },

    /// Backend refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),
}

/// Errors that end a channel session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Subscribing or watching failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The rendering surface failed.
    #[error("render failed: {0}")]
    Render(String),
}
