//! Core projections for murmur chat channels.
//!
//! Everything in this crate is a pure state machine: it consumes log events,
//! presence snapshots and fetch results, and returns actions for the caller
//! to execute. No I/O happens here, which keeps the fold deterministic and
//! lets the same code run against a live backend and in simulation.
//!
//! # Components
//!
//! - [`TranscriptProjector`]: folds appends and updates into an ordered
//!   transcript, driving each photo through `pending -> fetching -> resolved`
//! - [`PresenceTracker`]: folds presence snapshots into "someone else is
//!   typing"
//! - [`Outbox`]: optimistic sends awaiting acceptance by the log
//! - [`SessionConfig`]: per-session settings, including the bubble [`Theme`]
//! - [`env::Environment`]: time and randomness abstraction

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
pub mod env;
mod error;
mod media;
mod outbox;
mod presence;
mod transcript;

pub use config::{SessionConfig, THEME_CONFIG_KEY, Theme};
pub use error::{ConfigError, FetchError};
pub use media::{MediaKind, MediaPolicy, MediaState, RemoteMediaObject};
pub use outbox::{LocalId, Outbox, OutboxEntry, OutgoingMessage, SendStatus};
pub use presence::{PresenceAction, PresenceTracker};
pub use transcript::{
    Diagnostic, Direction, EntryContent, TranscriptAction, TranscriptEntry, TranscriptEvent,
    TranscriptProjector,
};
