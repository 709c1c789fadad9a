//! Error types for record encoding and payload decoding.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while moving records to and from bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// CBOR serialization failed.
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),

    /// Encoded record exceeds [`crate::MAX_RECORD_SIZE`].
    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge {
        /// Size of the rejected record.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// A record that parsed but does not describe a valid message.
///
/// Decode failures are never fatal: the offending event is dropped from the
/// projection and reported as a diagnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// `senderId` absent or empty.
    #[error("record has no sender id")]
    MissingSenderId,

    /// Text record without `senderName`.
    #[error("text record has no sender name")]
    MissingSenderName,

    /// Record carries neither `text` nor `photoURL`.
    #[error("record has neither text nor photo url")]
    MissingText,

    /// Text record whose `text` is the empty string.
    #[error("text record has empty text")]
    EmptyText,

    /// Bytes could not be turned into a record at all.
    #[error("malformed record: {0}")]
    Malformed(#[from] ProtocolError),
}
