//! Commands from the UI to a running session.

use bytes::Bytes;
use murmur_core::LocalId;

/// Intents the UI sends into [`crate::ChannelSession::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Send a text message.
    SendText(String),

    /// Send a photo: append a placeholder, upload, then resolve the
    /// placeholder with the upload URL.
    SendPhoto {
        /// Image bytes.
        bytes: Bytes,
        /// MIME type.
        content_type: String,
    },

    /// Local typing state changed.
    SetTyping(bool),

    /// Composer text changed. Non-empty text means the local participant is
    /// typing.
    ComposerChanged(String),

    /// Resend a message that failed.
    RetryFailed(LocalId),

    /// Drop local projections and subscribe again from scratch.
    Resubscribe,

    /// End the session.
    Leave,
}
