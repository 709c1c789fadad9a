//! Backend contracts.
//!
//! The session never talks to a concrete service. Each external collaborator
//! is a trait here, and implementations may target any ordered pub/sub log,
//! document store change feed, or the in-process [`crate::MemoryBackend`].
//!
//! Methods return `Send` futures so sessions can run on a multi-threaded
//! runtime. Backends are cheap handles (`Clone`), typically sharing state via
//! `Arc`, so a clone can be moved into spawned fetch and send tasks.

use std::{collections::HashMap, future::Future};

use bytes::Bytes;
use murmur_core::{FetchError, RemoteMediaObject, Theme};
use murmur_proto::{ChannelId, EventKey, FieldDelta, ParticipantId, PresenceEntry};
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Handle of a server-side registration (log subscription or presence
/// watch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// One delivered log event. `record` holds the encoded
/// [`murmur_proto::EventRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Key assigned by the log.
    pub key: EventKey,
    /// CBOR-encoded record, current as of delivery.
    pub record: Bytes,
}

/// Live log subscription.
///
/// Appends arrive in log order, once each. Updates arrive for events already
/// delivered on `appends`. Both streams end after
/// [`EventLogClient::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    /// Registration to release on teardown.
    pub id: SubscriptionId,
    /// Appended events, replay window first.
    pub appends: mpsc::UnboundedReceiver<LogEvent>,
    /// In-place updates.
    pub updates: mpsc::UnboundedReceiver<LogEvent>,
}

/// Live presence query: every change delivers the full set of entries with
/// `is_typing == true`.
#[derive(Debug)]
pub struct PresenceWatch {
    /// Registration to release on teardown.
    pub id: SubscriptionId,
    /// Query results, current snapshot first.
    pub snapshots: mpsc::UnboundedReceiver<Vec<PresenceEntry>>,
}

/// Ordered, append-only event log scoped by channel.
pub trait EventLogClient: Clone + Send + Sync + 'static {
    /// Subscribe to a channel.
    ///
    /// `since_limit` restricts the initial replay to the most recent N
    /// events; `None` replays everything.
    fn subscribe(
        &self,
        channel: &ChannelId,
        since_limit: Option<usize>,
    ) -> impl Future<Output = Result<Subscription, TransportError>> + Send;

    /// Append an encoded record. Returns the key the log assigned.
    ///
    /// Acceptance is the only acknowledgement; delivery to subscribers,
    /// including our own, follows through the subscription.
    fn append(
        &self,
        channel: &ChannelId,
        record: Bytes,
    ) -> impl Future<Output = Result<EventKey, TransportError>> + Send;

    /// Mutate an existing event in place.
    fn update_field(
        &self,
        channel: &ChannelId,
        key: EventKey,
        delta: FieldDelta,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Release a subscription. No further events are pushed for `id`.
    fn unsubscribe(&self, id: SubscriptionId) -> impl Future<Output = ()> + Send;
}

/// Ephemeral per-participant presence set.
pub trait PresenceStore: Clone + Send + Sync + 'static {
    /// Write (overwrite) a participant's typing flag.
    fn set_typing(
        &self,
        channel: &ChannelId,
        participant: &ParticipantId,
        is_typing: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Remove the participant's entry automatically if its connection drops.
    ///
    /// Backends without native disconnect hooks may implement this with
    /// heartbeats and a TTL.
    fn register_disconnect_cleanup(
        &self,
        channel: &ChannelId,
        participant: &ParticipantId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Remove the participant's entry now.
    fn clear(
        &self,
        channel: &ChannelId,
        participant: &ParticipantId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Watch the set of typing participants.
    fn watch_typing(
        &self,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<PresenceWatch, TransportError>> + Send;

    /// Release a presence watch.
    fn unwatch(&self, id: SubscriptionId) -> impl Future<Output = ()> + Send;
}

/// Blob storage for message media.
pub trait BlobStore: Clone + Send + Sync + 'static {
    /// Store bytes and return the URL they can be fetched from.
    fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Fetch an object with its content type.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<RemoteMediaObject, FetchError>> + Send;
}

/// Remote feature-flag service.
pub trait ConfigSource: Send + Sync {
    /// Current key/value configuration.
    fn fetch(&self) -> impl Future<Output = Result<HashMap<String, String>, TransportError>> + Send;
}

/// Resolve the bubble theme from remote config, falling back on any failure.
pub async fn resolve_theme<C: ConfigSource>(source: &C, fallback: Theme) -> Theme {
    match source.fetch().await {
        Ok(values) => Theme::from_remote(&values, fallback),
        Err(error) => {
            tracing::warn!(%error, %fallback, "remote config unavailable, using default theme");
            fallback
        },
    }
}
