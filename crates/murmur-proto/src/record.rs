//! Persisted event record and its CBOR codec.
//!
//! The log never interprets records; it stores the encoded bytes and hands
//! them back on replay. Only clients decode them, via
//! [`crate::Payload::from_record`].

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Sentinel `photoURL` of a placeholder whose media is not uploaded yet.
pub const PHOTO_URL_NOT_SET: &str = "NOTSET";

/// Upper bound on an encoded record. Checked before parsing.
pub const MAX_RECORD_SIZE: usize = 1 << 20;

/// One entry of a channel log, exactly as it is persisted.
///
/// All fields are optional at this layer so that malformed records still
/// parse and can be rejected with a precise [`crate::DecodeError`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Author of the message.
    #[serde(rename = "senderId", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,

    /// Display name of the author.
    #[serde(rename = "senderName", default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// Message text, for text messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Media location, for photo messages. [`PHOTO_URL_NOT_SET`] until the
    /// upload completes.
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl EventRecord {
    /// Text message record.
    pub fn text(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: Some(sender_id.into()),
            sender_name: Some(sender_name.into()),
            text: Some(text.into()),
            photo_url: None,
        }
    }

    /// Photo placeholder record with the `NOTSET` sentinel.
    pub fn photo_placeholder(sender_id: impl Into<String>, sender_name: Option<String>) -> Self {
        Self {
            sender_id: Some(sender_id.into()),
            sender_name,
            text: None,
            photo_url: Some(PHOTO_URL_NOT_SET.to_owned()),
        }
    }

    /// Apply an in-place field update.
    pub fn apply(&mut self, delta: &FieldDelta) {
        match delta {
            FieldDelta::PhotoUrl(url) => self.photo_url = Some(url.clone()),
        }
    }

    /// Encode to CBOR.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    /// - `ProtocolError::RecordTooLarge` if the encoding exceeds
    ///   [`MAX_RECORD_SIZE`]
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;

        if buf.len() > MAX_RECORD_SIZE {
            return Err(ProtocolError::RecordTooLarge { size: buf.len(), max: MAX_RECORD_SIZE });
        }
        Ok(buf)
    }

    /// Decode from CBOR.
    ///
    /// The size check happens before parsing so oversized input never reaches
    /// the CBOR reader.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::RecordTooLarge` if `bytes` exceeds [`MAX_RECORD_SIZE`]
    /// - `ProtocolError::CborDecode` if the bytes are not a record
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(ProtocolError::RecordTooLarge { size: bytes.len(), max: MAX_RECORD_SIZE });
        }

        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
    }
}

/// In-place mutation of an existing record.
///
/// The only mutation clients perform is resolving a photo placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldDelta {
    /// Replace `photoURL`.
    PhotoUrl(String),
}
