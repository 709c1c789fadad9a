//! In-memory backend implementation.
//!
//! Event logs, presence sets, blobs and remote config held in process. Used
//! by the simulation harness and by the `murmur` replay binary; nothing is
//! persisted.

use std::{
    collections::{BTreeMap, HashMap},
    future::{Future, ready},
    sync::{Arc, Mutex, MutexGuard},
};

use bytes::Bytes;
use murmur_core::{FetchError, RemoteMediaObject};
use murmur_proto::{
    ChannelId, EventKey, EventRecord, FieldDelta, ParticipantId, PresenceEntry,
};
use tokio::sync::mpsc;

use crate::{
    backend::{
        BlobStore, ConfigSource, EventLogClient, LogEvent, PresenceStore, PresenceWatch,
        Subscription, SubscriptionId,
    },
    error::TransportError,
};

/// In-process backend for testing, simulation and offline replay.
///
/// Implements every backend contract over one shared state: channel logs,
/// presence sets, blobs and remote config. All state is wrapped in
/// `Arc<Mutex<>>` so clones observe the same backend. Events are pushed to
/// subscribers synchronously inside the mutating call, so delivery order
/// equals log order.
///
/// Uses `lock().expect()`, which panics if the mutex is poisoned. Acceptable
/// for test and replay code.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryBackendInner>>,
}

#[derive(Default)]
struct MemoryBackendInner {
    /// Encoded records per channel; the index is the event key.
    logs: HashMap<ChannelId, Vec<Bytes>>,

    /// Live log subscriptions.
    subscribers: HashMap<SubscriptionId, Subscriber>,

    /// Presence entries per channel.
    presence: HashMap<ChannelId, BTreeMap<ParticipantId, bool>>,

    /// Channels whose entry must be removed when a participant disconnects.
    cleanups: HashMap<ParticipantId, Vec<ChannelId>>,

    /// Live presence watches.
    watchers: HashMap<SubscriptionId, Watcher>,

    /// Blobs by URL: (content type, bytes).
    blobs: HashMap<String, (String, Bytes)>,

    /// Remote config. `None` makes fetches fail.
    config: Option<HashMap<String, String>>,

    /// Refuse appends and updates.
    read_only: bool,

    next_id: u64,

    /// Suffix for the next uploaded blob URL.
    next_blob: u64,
}

struct Subscriber {
    channel: ChannelId,
    appends: mpsc::UnboundedSender<LogEvent>,
    updates: mpsc::UnboundedSender<LogEvent>,
}

struct Watcher {
    channel: ChannelId,
    snapshots: mpsc::UnboundedSender<Vec<PresenceEntry>>,
}

impl MemoryBackendInner {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn typing_snapshot(&self, channel: &ChannelId) -> Vec<PresenceEntry> {
        self.presence
            .get(channel)
            .into_iter()
            .flatten()
            .filter(|(_, typing)| **typing)
            .map(|(participant, _)| PresenceEntry::typing(participant.clone()))
            .collect()
    }

    fn notify_watchers(&self, channel: &ChannelId) {
        let snapshot = self.typing_snapshot(channel);
        for watcher in self.watchers.values().filter(|w| w.channel == *channel) {
            // A dropped receiver only means the watcher is gone; unwatch cleans up.
            let _ = watcher.snapshots.send(snapshot.clone());
        }
    }

    fn publish(&self, channel: &ChannelId, event: &LogEvent, update: bool) {
        for subscriber in self.subscribers.values().filter(|s| s.channel == *channel) {
            let sender = if update { &subscriber.updates } else { &subscriber.appends };
            let _ = sender.send(event.clone());
        }
    }
}

impl MemoryBackend {
    /// Create an empty backend with remote config unavailable.
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, MemoryBackendInner> {
        self.inner.lock().expect("Mutex poisoned")
    }

    /// Serve the given remote config.
    pub fn set_remote_config(&self, values: HashMap<String, String>) {
        self.lock().config = Some(values);
    }

    /// Refuse (or accept again) appends and updates.
    pub fn set_read_only(&self, read_only: bool) {
        self.lock().read_only = read_only;
    }

    /// Store a blob under a caller-chosen URL.
    pub fn insert_blob(&self, url: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) {
        self.lock().blobs.insert(url.into(), (content_type.into(), bytes));
    }

    /// Simulate an ungraceful disconnect: run the participant's registered
    /// cleanups.
    pub fn disconnect(&self, participant: &ParticipantId) {
        let mut inner = self.lock();
        let channels = inner.cleanups.remove(participant).unwrap_or_default();
        for channel in channels {
            let removed =
                inner.presence.get_mut(&channel).and_then(|set| set.remove(participant)).is_some();
            if removed {
                tracing::debug!(%channel, %participant, "disconnect cleanup removed presence");
                inner.notify_watchers(&channel);
            }
        }
    }

    /// Decoded records of a channel, in log order.
    pub fn records(&self, channel: &ChannelId) -> Vec<EventRecord> {
        self.lock()
            .logs
            .get(channel)
            .into_iter()
            .flatten()
            .filter_map(|bytes| EventRecord::decode(bytes).ok())
            .collect()
    }

    /// Current presence entries of a channel, typing or not.
    pub fn presence(&self, channel: &ChannelId) -> Vec<PresenceEntry> {
        self.lock()
            .presence
            .get(channel)
            .into_iter()
            .flatten()
            .map(|(participant, is_typing)| PresenceEntry {
                participant_id: participant.clone(),
                is_typing: *is_typing,
            })
            .collect()
    }

    /// Number of live log subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Number of live presence watches.
    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    fn subscribe_sync(&self, channel: &ChannelId, since_limit: Option<usize>) -> Subscription {
        let mut inner = self.lock();
        let (appends_tx, appends) = mpsc::unbounded_channel();
        let (updates_tx, updates) = mpsc::unbounded_channel();

        let log = inner.logs.get(channel).map(Vec::as_slice).unwrap_or_default();
        let start = since_limit.map_or(0, |limit| log.len().saturating_sub(limit));
        let replayed = log.len() - start;
        for (index, record) in log.iter().enumerate().skip(start) {
            let _ = appends_tx
                .send(LogEvent { key: EventKey::new(index as u64), record: record.clone() });
        }

        let id = inner.next_id();
        inner.subscribers.insert(id, Subscriber {
            channel: channel.clone(),
            appends: appends_tx,
            updates: updates_tx,
        });
        tracing::debug!(%channel, ?since_limit, replayed, "subscribed");

        Subscription { id, appends, updates }
    }

    fn append_sync(&self, channel: &ChannelId, record: Bytes) -> Result<EventKey, TransportError> {
        let mut inner = self.lock();
        if inner.read_only {
            return Err(TransportError::Rejected("log is read-only".into()));
        }
        EventRecord::decode(&record)?;

        let log = inner.logs.entry(channel.clone()).or_default();
        let key = EventKey::new(log.len() as u64);
        log.push(record.clone());

        inner.publish(channel, &LogEvent { key, record }, false);
        Ok(key)
    }

    fn update_sync(
        &self,
        channel: &ChannelId,
        key: EventKey,
        delta: &FieldDelta,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.read_only {
            return Err(TransportError::Rejected("log is read-only".into()));
        }

        let slot = inner
            .logs
            .get_mut(channel)
            .and_then(|log| log.get_mut(key.index() as usize))
            .ok_or_else(|| TransportError::UnknownEvent { channel: channel.clone(), key })?;

        let mut record = EventRecord::decode(slot)?;
        record.apply(delta);
        let encoded = Bytes::from(record.encode()?);
        *slot = encoded.clone();

        inner.publish(channel, &LogEvent { key, record: encoded }, true);
        Ok(())
    }

    fn set_presence_sync(&self, channel: &ChannelId, participant: &ParticipantId, typing: bool) {
        let mut inner = self.lock();
        inner.presence.entry(channel.clone()).or_default().insert(participant.clone(), typing);
        inner.notify_watchers(channel);
    }

    fn clear_presence_sync(&self, channel: &ChannelId, participant: &ParticipantId) {
        let mut inner = self.lock();
        let removed =
            inner.presence.get_mut(channel).and_then(|set| set.remove(participant)).is_some();
        if let Some(channels) = inner.cleanups.get_mut(participant) {
            channels.retain(|c| c != channel);
        }
        if removed {
            inner.notify_watchers(channel);
        }
    }

    fn watch_sync(&self, channel: &ChannelId) -> PresenceWatch {
        let mut inner = self.lock();
        let (tx, snapshots) = mpsc::unbounded_channel();
        let _ = tx.send(inner.typing_snapshot(channel));

        let id = inner.next_id();
        inner.watchers.insert(id, Watcher { channel: channel.clone(), snapshots: tx });
        PresenceWatch { id, snapshots }
    }

    fn upload_sync(&self, bytes: Bytes, content_type: &str) -> String {
        let mut inner = self.lock();
        let url = loop {
            let url = format!("mem://blobs/{}", inner.next_blob);
            inner.next_blob += 1;
            if !inner.blobs.contains_key(&url) {
                break url;
            }
        };
        inner.blobs.insert(url.clone(), (content_type.to_owned(), bytes));
        url
    }

    fn fetch_sync(&self, url: &str) -> Result<RemoteMediaObject, FetchError> {
        self.lock()
            .blobs
            .get(url)
            .map(|(content_type, bytes)| RemoteMediaObject {
                url: url.to_owned(),
                content_type: content_type.clone(),
                bytes: bytes.clone(),
            })
            .ok_or_else(|| FetchError::NotFound { url: url.to_owned() })
    }
}

impl EventLogClient for MemoryBackend {
    fn subscribe(
        &self,
        channel: &ChannelId,
        since_limit: Option<usize>,
    ) -> impl Future<Output = Result<Subscription, TransportError>> + Send {
        ready(Ok(self.subscribe_sync(channel, since_limit)))
    }

    fn append(
        &self,
        channel: &ChannelId,
        record: Bytes,
    ) -> impl Future<Output = Result<EventKey, TransportError>> + Send {
        ready(self.append_sync(channel, record))
    }

    fn update_field(
        &self,
        channel: &ChannelId,
        key: EventKey,
        delta: FieldDelta,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        ready(self.update_sync(channel, key, &delta))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> impl Future<Output = ()> + Send {
        if self.lock().subscribers.remove(&id).is_some() {
            tracing::debug!(?id, "unsubscribed");
        }
        ready(())
    }
}

impl PresenceStore for MemoryBackend {
    fn set_typing(
        &self,
        channel: &ChannelId,
        participant: &ParticipantId,
        is_typing: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.set_presence_sync(channel, participant, is_typing);
        ready(Ok(()))
    }

    fn register_disconnect_cleanup(
        &self,
        channel: &ChannelId,
        participant: &ParticipantId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let mut inner = self.lock();
        let channels = inner.cleanups.entry(participant.clone()).or_default();
        if !channels.contains(channel) {
            channels.push(channel.clone());
        }
        ready(Ok(()))
    }

    fn clear(
        &self,
        channel: &ChannelId,
        participant: &ParticipantId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.clear_presence_sync(channel, participant);
        ready(Ok(()))
    }

    fn watch_typing(
        &self,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<PresenceWatch, TransportError>> + Send {
        ready(Ok(self.watch_sync(channel)))
    }

    fn unwatch(&self, id: SubscriptionId) -> impl Future<Output = ()> + Send {
        self.lock().watchers.remove(&id);
        ready(())
    }
}

impl BlobStore for MemoryBackend {
    fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send {
        ready(Ok(self.upload_sync(bytes, content_type)))
    }

    fn fetch(&self, url: &str) -> impl Future<Output = Result<RemoteMediaObject, FetchError>> + Send {
        ready(self.fetch_sync(url))
    }
}

impl ConfigSource for MemoryBackend {
    fn fetch(&self) -> impl Future<Output = Result<HashMap<String, String>, TransportError>> + Send {
        let config = self.lock().config.clone();
        ready(config.ok_or_else(|| TransportError::Rejected("remote config unavailable".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelId {
        ChannelId::new("general")
    }

    fn encoded(text: &str) -> Bytes {
        Bytes::from(EventRecord::text("u1", "Ann", text).encode().unwrap())
    }

    #[tokio::test]
    async fn replay_respects_since_limit() {
        let backend = MemoryBackend::new();
        for text in ["a", "b", "c", "d"] {
            backend.append(&channel(), encoded(text)).await.unwrap();
        }

        let mut sub = backend.subscribe(&channel(), Some(2)).await.unwrap();
        assert_eq!(sub.appends.recv().await.map(|e| e.key), Some(EventKey::new(2)));
        assert_eq!(sub.appends.recv().await.map(|e| e.key), Some(EventKey::new(3)));
        assert!(sub.appends.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe(&channel(), None).await.unwrap();
        backend.unsubscribe(sub.id).await;
        backend.append(&channel(), encoded("late")).await.unwrap();

        assert_eq!(sub.appends.recv().await, None);
        assert_eq!(backend.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn update_unknown_event_fails() {
        let backend = MemoryBackend::new();
        let result = backend
            .update_field(&channel(), EventKey::new(9), FieldDelta::PhotoUrl("x".into()))
            .await;
        assert!(matches!(result, Err(TransportError::UnknownEvent { .. })));
    }

    #[tokio::test]
    async fn update_rewrites_record_and_notifies() {
        let backend = MemoryBackend::new();
        let placeholder = EventRecord::photo_placeholder("u1", None).encode().unwrap();
        let key = backend.append(&channel(), Bytes::from(placeholder)).await.unwrap();
        let mut sub = backend.subscribe(&channel(), None).await.unwrap();

        backend
            .update_field(&channel(), key, FieldDelta::PhotoUrl("gs://bucket/a.png".into()))
            .await
            .unwrap();

        let event = sub.updates.recv().await.unwrap();
        let record = EventRecord::decode(&event.record).unwrap();
        assert_eq!(record.photo_url.as_deref(), Some("gs://bucket/a.png"));
        assert_eq!(backend.records(&channel())[0], record);
    }

    #[tokio::test]
    async fn disconnect_runs_registered_cleanup() {
        let backend = MemoryBackend::new();
        let me = ParticipantId::new("u1");
        backend.set_typing(&channel(), &me, true).await.unwrap();
        backend.register_disconnect_cleanup(&channel(), &me).await.unwrap();
        let mut watch = backend.watch_typing(&channel()).await.unwrap();
        assert_eq!(watch.snapshots.recv().await, Some(vec![PresenceEntry::typing("u1")]));

        backend.disconnect(&me);

        assert_eq!(watch.snapshots.recv().await, Some(vec![]));
        assert!(backend.presence(&channel()).is_empty());
    }

    #[tokio::test]
    async fn malformed_appends_are_refused() {
        let backend = MemoryBackend::new();
        let result = backend.append(&channel(), Bytes::from_static(&[0xff])).await;
        assert!(matches!(result, Err(TransportError::Codec(_))));
    }

    #[tokio::test]
    async fn missing_remote_config_is_an_error() {
        let backend = MemoryBackend::new();
        assert!(ConfigSource::fetch(&backend).await.is_err());
    }

    #[tokio::test]
    async fn uploads_never_overwrite_inserted_blobs() {
        let backend = MemoryBackend::new();
        backend.insert_blob("mem://blobs/0", "image/png", Bytes::from_static(b"seeded"));

        let url = backend.upload(Bytes::from_static(b"uploaded"), "image/jpeg").await.unwrap();
        assert_ne!(url, "mem://blobs/0");

        let seeded = BlobStore::fetch(&backend, "mem://blobs/0").await.unwrap();
        assert_eq!(seeded.bytes, Bytes::from_static(b"seeded"));
        let uploaded = BlobStore::fetch(&backend, &url).await.unwrap();
        assert_eq!(uploaded.bytes, Bytes::from_static(b"uploaded"));
    }
}
