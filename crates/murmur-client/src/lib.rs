//! Client
//!
//! Runtime that keeps one chat channel's local projection in sync with its
//! remote event log and presence set.
//!
//! # Architecture
//!
//! Projection logic lives in [`murmur_core`] as pure state machines. This
//! crate supplies the I/O around them: backend traits for the log, presence
//! store, blob store and remote config, and [`ChannelSession`], the
//! single-owner event loop that feeds backend events into the projections and
//! executes the actions they return.
//!
//! # Components
//!
//! - [`EventLogClient`], [`PresenceStore`], [`BlobStore`], [`ConfigSource`]:
//!   backend contracts
//! - [`ChannelSession`]: per-channel event loop
//! - [`Renderer`]: rendering surface fed with [`SessionView`]s
//! - [`MemoryBackend`]: in-process backend implementing every contract
//! - [`ChaoticBlobStore`]: fault-injecting blob store wrapper
//! - [`SystemEnv`]: production [`Environment`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backend;
mod chaotic;
mod command;
mod error;
mod memory;
mod renderer;
mod session;
mod system_env;
mod view;

pub use backend::{
    BlobStore, ConfigSource, EventLogClient, LogEvent, PresenceStore, PresenceWatch,
    Subscription, SubscriptionId, resolve_theme,
};
pub use chaotic::{ChaoticBlobStore, Fault};
pub use command::SessionCommand;
pub use error::{SessionError, TransportError};
pub use memory::MemoryBackend;
pub use murmur_core::env::Environment;
pub use renderer::Renderer;
pub use session::{ChannelSession, Services};
pub use system_env::SystemEnv;
pub use view::SessionView;
