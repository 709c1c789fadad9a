//! Wire-level types for murmur channels.
//!
//! Every chat channel is backed by an append-only log of [`EventRecord`]s and
//! an ephemeral presence set of [`PresenceEntry`]s. This crate owns the
//! persisted shape of those records and the rules for turning a raw record
//! into a typed [`Payload`]. It has no notion of sessions or transports.
//!
//! # Record shape
//!
//! ```text
//! Event := { senderId: string, senderName?: string, text?: string, photoURL?: string }
//! ```
//!
//! A `photoURL` equal to [`PHOTO_URL_NOT_SET`] marks a photo placeholder whose
//! media has not been uploaded yet. The placeholder is later resolved by an
//! in-place update of the same record.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod ids;
mod payload;
mod presence;
mod record;

pub use errors::{DecodeError, ProtocolError, Result};
pub use ids::{ChannelId, EventKey, ParticipantId};
pub use payload::{Payload, PhotoUrl};
pub use presence::PresenceEntry;
pub use record::{EventRecord, FieldDelta, MAX_RECORD_SIZE, PHOTO_URL_NOT_SET};
