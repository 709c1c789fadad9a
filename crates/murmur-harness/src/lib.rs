//! Deterministic simulation harness for murmur channel sessions.
//!
//! Seeded implementations of the session's ambient traits, a recording
//! renderer, and a scenario driver over the in-process
//! [`murmur_client::MemoryBackend`], so whole sessions can be exercised
//! reproducibly in tests.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties against every
//! rendered [`murmur_client::SessionView`]. Use
//! [`InvariantRegistry::standard()`] for the common transcript and presence
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod recording;
pub mod scenario;
pub mod sim_env;

pub use invariants::{
    FailedSendsAreFailed, Invariant, InvariantRegistry, InvariantResult, LogOrder,
    PendingMediaConsistency, SelfNeverTyping, UniqueKeys, Violation,
};
pub use recording::RecordingRenderer;
pub use scenario::{RunningSession, Scenario};
pub use sim_env::SimEnv;
