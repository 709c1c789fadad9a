//! Typed message payloads.
//!
//! A raw [`EventRecord`] becomes a [`Payload`] only if it satisfies the
//! message rules. The decision between text and photo is made on the presence
//! of `photoURL`, matching how records are written.

use crate::{
    errors::DecodeError,
    ids::ParticipantId,
    record::{EventRecord, PHOTO_URL_NOT_SET},
};

/// Location of a photo message's media.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhotoUrl {
    /// Sentinel: upload has not completed.
    NotSet,
    /// Resolvable remote object.
    Remote(String),
}

impl PhotoUrl {
    /// Interpret a raw `photoURL` value. The sentinel and the empty string both
    /// mean "not set".
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() || raw == PHOTO_URL_NOT_SET {
            Self::NotSet
        } else {
            Self::Remote(raw.to_owned())
        }
    }

    /// Remote URL, if the media has been uploaded.
    pub fn remote(&self) -> Option<&str> {
        match self {
            Self::NotSet => None,
            Self::Remote(url) => Some(url),
        }
    }

    /// Raw value as persisted.
    pub fn as_raw(&self) -> &str {
        match self {
            Self::NotSet => PHOTO_URL_NOT_SET,
            Self::Remote(url) => url,
        }
    }
}

/// A validated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text message. Immutable once appended.
    Text {
        /// Author.
        sender_id: ParticipantId,
        /// Author display name.
        sender_name: String,
        /// Non-empty message text.
        text: String,
    },

    /// Photo message. Appended before its media exists and resolved later by
    /// an update of the same event.
    Photo {
        /// Author.
        sender_id: ParticipantId,
        /// Author display name, when recorded.
        sender_name: Option<String>,
        /// Media location at append time.
        photo_url: PhotoUrl,
    },
}

impl Payload {
    /// Validate a record.
    ///
    /// # Errors
    ///
    /// - `DecodeError::MissingSenderId` if `senderId` is absent or empty
    /// - `DecodeError::MissingSenderName` for text without `senderName`
    /// - `DecodeError::MissingText` if neither `text` nor `photoURL` is set
    /// - `DecodeError::EmptyText` for text equal to `""`
    pub fn from_record(record: &EventRecord) -> Result<Self, DecodeError> {
        let sender_id = match record.sender_id.as_deref() {
            Some(id) if !id.is_empty() => ParticipantId::new(id),
            _ => return Err(DecodeError::MissingSenderId),
        };

        if let Some(raw) = &record.photo_url {
            return Ok(Self::Photo {
                sender_id,
                sender_name: record.sender_name.clone(),
                photo_url: PhotoUrl::parse(raw),
            });
        }

        let sender_name = record.sender_name.clone().ok_or(DecodeError::MissingSenderName)?;
        let text = record.text.clone().ok_or(DecodeError::MissingText)?;
        if text.is_empty() {
            return Err(DecodeError::EmptyText);
        }

        Ok(Self::Text { sender_id, sender_name, text })
    }

    /// Decode CBOR bytes and validate the record.
    ///
    /// # Errors
    ///
    /// Everything [`Payload::from_record`] returns, plus
    /// `DecodeError::Malformed` if the bytes are not a record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let record = EventRecord::decode(bytes)?;
        Self::from_record(&record)
    }

    /// Persisted form of this payload.
    pub fn to_record(&self) -> EventRecord {
        match self {
            Self::Text { sender_id, sender_name, text } => {
                EventRecord::text(sender_id.as_str(), sender_name.as_str(), text.as_str())
            },
            Self::Photo { sender_id, sender_name, photo_url } => EventRecord {
                sender_id: Some(sender_id.as_str().to_owned()),
                sender_name: sender_name.clone(),
                text: None,
                photo_url: Some(photo_url.as_raw().to_owned()),
            },
        }
    }

    /// Author of the message.
    pub fn sender_id(&self) -> &ParticipantId {
        match self {
            Self::Text { sender_id, .. } | Self::Photo { sender_id, .. } => sender_id,
        }
    }
}
