//! Optimistic sends.
//!
//! Appends are fire-and-forget against the log, so the only way to tell the
//! user a message did not go out is to remember it locally until the log
//! accepts it. Accepted messages leave the outbox; their log echo becomes the
//! transcript entry.

use std::fmt;

use bytes::Bytes;
use murmur_proto::EventKey;

use crate::env::Environment;

/// Local identifier of an optimistic send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(u64);

impl LocalId {
    /// Raw value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{:016x}", self.0)
    }
}

/// What the user asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingMessage {
    /// Text message.
    Text(String),
    /// Photo to upload.
    Photo {
        /// Image bytes.
        bytes: Bytes,
        /// MIME type.
        content_type: String,
    },
}

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    /// Handed to the log, no answer yet.
    Sending,
    /// Log or blob store refused. Shown to the user as "failed to send".
    Failed {
        /// Failure description.
        reason: String,
    },
}

/// One optimistic send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Local identifier.
    pub local_id: LocalId,
    /// Message being sent.
    pub message: OutgoingMessage,
    /// Placeholder key of a photo send, once the placeholder was appended.
    /// A retry resumes from the upload instead of appending again.
    pub placeholder: Option<EventKey>,
    /// Delivery state.
    pub status: SendStatus,
}

/// Sends awaiting acceptance, in the order they were staged.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    entries: Vec<OutboxEntry>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a message and return its local id.
    pub fn stage<E: Environment>(&mut self, env: &E, message: OutgoingMessage) -> LocalId {
        let local_id = loop {
            let candidate = LocalId(env.random_u64());
            if self.get(candidate).is_none() {
                break candidate;
            }
        };

        self.entries.push(OutboxEntry {
            local_id,
            message,
            placeholder: None,
            status: SendStatus::Sending,
        });
        local_id
    }

    /// Record the placeholder key of a photo send.
    pub fn set_placeholder(&mut self, local_id: LocalId, key: EventKey) {
        if let Some(entry) = self.get_mut(local_id) {
            entry.placeholder = Some(key);
        }
    }

    /// The log accepted the message. Returns the removed entry.
    pub fn mark_accepted(&mut self, local_id: LocalId) -> Option<OutboxEntry> {
        let position = self.entries.iter().position(|e| e.local_id == local_id)?;
        Some(self.entries.remove(position))
    }

    /// The send failed. Returns `false` if the id is unknown.
    pub fn mark_failed(&mut self, local_id: LocalId, reason: impl Into<String>) -> bool {
        match self.get_mut(local_id) {
            Some(entry) => {
                entry.status = SendStatus::Failed { reason: reason.into() };
                true
            },
            None => false,
        }
    }

    /// Move a failed entry back to `Sending`. Returns the entry to resend, or
    /// `None` if the id is unknown or not failed.
    pub fn retry(&mut self, local_id: LocalId) -> Option<OutboxEntry> {
        let entry = self.get_mut(local_id)?;
        if !matches!(entry.status, SendStatus::Failed { .. }) {
            return None;
        }
        entry.status = SendStatus::Sending;
        Some(entry.clone())
    }

    /// Entry by local id.
    pub fn get(&self, local_id: LocalId) -> Option<&OutboxEntry> {
        self.entries.iter().find(|e| e.local_id == local_id)
    }

    /// Entries that failed to send.
    pub fn failed(&self) -> impl Iterator<Item = &OutboxEntry> {
        self.entries.iter().filter(|e| matches!(e.status, SendStatus::Failed { .. }))
    }

    /// Number of entries, sending or failed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_mut(&mut self, local_id: LocalId) -> Option<&mut OutboxEntry> {
        self.entries.iter_mut().find(|e| e.local_id == local_id)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    };

    use super::*;

    /// Counts up from zero, repeating the first value once to force a
    /// collision.
    #[derive(Clone, Default)]
    struct CountingEnv(Arc<AtomicU64>);

    impl Environment for CountingEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let n = self.0.fetch_add(1, Ordering::Relaxed).saturating_sub(1);
            let bytes = n.to_be_bytes();
            for (dst, src) in buffer.iter_mut().zip(bytes.iter()) {
                *dst = *src;
            }
        }
    }

    #[test]
    fn colliding_local_ids_are_redrawn() {
        let env = CountingEnv::default();
        let mut outbox = Outbox::new();
        let a = outbox.stage(&env, OutgoingMessage::Text("a".into()));
        let b = outbox.stage(&env, OutgoingMessage::Text("b".into()));

        assert_ne!(a, b);
        assert_eq!(outbox.len(), 2);
    }

    #[test]
    fn failed_entries_are_listed_and_retryable() {
        let env = CountingEnv::default();
        let mut outbox = Outbox::new();
        let id = outbox.stage(&env, OutgoingMessage::Text("hi".into()));

        assert!(outbox.retry(id).is_none());
        assert!(outbox.mark_failed(id, "log unavailable"));
        assert_eq!(outbox.failed().count(), 1);

        let entry = outbox.retry(id).unwrap();
        assert_eq!(entry.message, OutgoingMessage::Text("hi".into()));
        assert_eq!(outbox.failed().count(), 0);
    }

    #[test]
    fn accepted_entries_leave_the_outbox() {
        let env = CountingEnv::default();
        let mut outbox = Outbox::new();
        let id = outbox.stage(&env, OutgoingMessage::Text("hi".into()));

        assert!(outbox.mark_accepted(id).is_some());
        assert!(outbox.is_empty());
        assert!(!outbox.mark_failed(id, "late"));
    }
}
