//! Transcript projection.
//!
//! [`TranscriptProjector`] folds a channel's log into the ordered list of
//! entries a renderer draws. It is a pure state machine: inputs are
//! [`TranscriptEvent`]s, outputs are [`TranscriptAction`]s (fetch requests,
//! render requests, diagnostics).
//!
//! # Invariants
//!
//! - Entries appear in log arrival order and are never re-sorted.
//! - Each `EventKey` produces at most one entry; replayed appends are no-ops.
//! - A key is in `pending_media` iff its entry is a photo not yet resolved.
//! - A fetch result is applied only if the entry is still fetching the same
//!   URL at the same attempt. Anything else is stale and discarded.

use std::{collections::HashMap, time::Duration};

use murmur_proto::{DecodeError, EventKey, EventRecord, ParticipantId, Payload, PhotoUrl};

use crate::{
    error::FetchError,
    media::{MediaPolicy, MediaState, RemoteMediaObject},
};

/// One renderable row of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// Log key of the originating event.
    pub key: EventKey,
    /// Author.
    pub sender_id: ParticipantId,
    /// Name shown next to the message.
    pub display_name: String,
    /// Message body.
    pub content: EntryContent,
}

impl TranscriptEntry {
    /// Which side of the conversation the entry sits on for `local`.
    pub fn direction(&self, local: &ParticipantId) -> Direction {
        if self.sender_id == *local { Direction::Outgoing } else { Direction::Incoming }
    }

    /// Name label above the bubble. Own messages carry none.
    pub fn sender_label(&self, local: &ParticipantId) -> Option<&str> {
        match self.direction(local) {
            Direction::Outgoing => None,
            Direction::Incoming => Some(&self.display_name),
        }
    }
}

/// Side of the conversation an entry is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the local participant.
    Outgoing,
    /// Sent by someone else.
    Incoming,
}

/// Body of a transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    /// Resolved text.
    Text(String),
    /// Photo and its fetch state.
    Photo(MediaState),
}

impl EntryContent {
    /// Media state, for photo entries.
    pub fn media(&self) -> Option<&MediaState> {
        match self {
            Self::Photo(state) => Some(state),
            Self::Text(_) => None,
        }
    }
}

/// Inputs to the transcript fold.
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    /// A new event was appended to the log.
    Appended {
        /// Log key.
        key: EventKey,
        /// Record as persisted.
        record: EventRecord,
    },

    /// An existing event was updated in place.
    Updated {
        /// Log key of the updated event.
        key: EventKey,
        /// Full record after the update.
        record: EventRecord,
    },

    /// A media fetch completed.
    MediaFetched {
        /// Entry the fetch was for.
        key: EventKey,
        /// Fetched object.
        object: RemoteMediaObject,
    },

    /// A media fetch failed or timed out.
    MediaFailed {
        /// Entry the fetch was for.
        key: EventKey,
        /// URL that was being fetched.
        url: String,
        /// Attempt that failed.
        attempt: u32,
        /// Cause.
        error: FetchError,
    },
}

/// Actions produced by the transcript fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptAction {
    /// Transcript changed, redraw.
    Render,

    /// Fetch a media object and feed the result back as
    /// [`TranscriptEvent::MediaFetched`] or [`TranscriptEvent::MediaFailed`].
    FetchMedia {
        /// Entry awaiting the media.
        key: EventKey,
        /// Object to fetch.
        url: String,
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before starting the fetch. Zero for first attempts.
        delay: Duration,
    },

    /// Something was dropped or gave up. Never fatal.
    Diagnostic(Diagnostic),
}

/// Non-fatal problems surfaced by the fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Appended record failed validation and was not inserted.
    Rejected {
        /// Key of the dropped event.
        key: EventKey,
        /// Why it was rejected.
        error: DecodeError,
    },

    /// A fetch failed and will be retried.
    MediaRetrying {
        /// Entry being fetched.
        key: EventKey,
        /// Attempt that failed.
        attempt: u32,
        /// Cause.
        error: FetchError,
    },

    /// A fetch failed and the retry budget is spent. The entry stays in
    /// `Fetching`.
    MediaAbandoned {
        /// Entry being fetched.
        key: EventKey,
        /// Attempts made.
        attempts: u32,
        /// Last cause.
        error: FetchError,
    },
}

/// Ordered transcript of one channel.
#[derive(Debug, Clone, Default)]
pub struct TranscriptProjector {
    /// Entries in arrival order.
    entries: Vec<TranscriptEntry>,
    /// Position of every folded key in `entries`.
    positions: HashMap<EventKey, usize>,
    /// Photo entries not yet resolved, by key.
    pending_media: HashMap<EventKey, usize>,
    policy: MediaPolicy,
}

impl TranscriptProjector {
    /// Create an empty projector with the given retry policy.
    pub fn new(policy: MediaPolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: TranscriptEvent) -> Vec<TranscriptAction> {
        match event {
            TranscriptEvent::Appended { key, record } => self.on_append(key, &record),
            TranscriptEvent::Updated { key, record } => self.on_update(key, &record),
            TranscriptEvent::MediaFetched { key, object } => self.on_media_fetched(key, object),
            TranscriptEvent::MediaFailed { key, url, attempt, error } => {
                self.on_media_failed(key, &url, attempt, error)
            },
        }
    }

    /// Fold an appended event.
    pub fn on_append(&mut self, key: EventKey, record: &EventRecord) -> Vec<TranscriptAction> {
        if self.positions.contains_key(&key) {
            tracing::debug!(%key, "ignoring replayed append");
            return vec![];
        }

        let payload = match Payload::from_record(record) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%key, %error, "dropping undecodable event");
                return vec![TranscriptAction::Diagnostic(Diagnostic::Rejected { key, error })];
            },
        };

        match payload {
            Payload::Text { sender_id, sender_name, text } => {
                self.push(TranscriptEntry {
                    key,
                    sender_id,
                    display_name: sender_name,
                    content: EntryContent::Text(text),
                });
                vec![TranscriptAction::Render]
            },
            Payload::Photo { sender_id, sender_name, photo_url } => {
                let display_name = sender_name.unwrap_or_else(|| sender_id.to_string());
                let position = self.push(TranscriptEntry {
                    key,
                    sender_id,
                    display_name,
                    content: EntryContent::Photo(MediaState::Pending),
                });
                self.pending_media.insert(key, position);

                match photo_url {
                    PhotoUrl::Remote(url) => self.start_fetch(key, url),
                    PhotoUrl::NotSet => vec![TranscriptAction::Render],
                }
            },
        }
    }

    /// Fold an appended event straight from its encoded bytes. Undecodable
    /// bytes are rejected like any other malformed record.
    pub fn on_append_bytes(&mut self, key: EventKey, bytes: &[u8]) -> Vec<TranscriptAction> {
        match EventRecord::decode(bytes) {
            Ok(record) => self.on_append(key, &record),
            Err(error) if self.positions.contains_key(&key) => {
                tracing::debug!(%key, %error, "ignoring replayed append");
                vec![]
            },
            Err(error) => {
                tracing::warn!(%key, %error, "dropping undecodable event");
                vec![TranscriptAction::Diagnostic(Diagnostic::Rejected {
                    key,
                    error: DecodeError::Malformed(error),
                })]
            },
        }
    }

    /// Fold an in-place update from its encoded bytes.
    pub fn on_update_bytes(&mut self, key: EventKey, bytes: &[u8]) -> Vec<TranscriptAction> {
        match EventRecord::decode(bytes) {
            Ok(record) => self.on_update(key, &record),
            Err(error) => {
                tracing::debug!(%key, %error, "ignoring undecodable update");
                vec![]
            },
        }
    }

    /// Fold an in-place update. Only photo URL changes matter; updates for
    /// keys without a pending photo are ignored.
    pub fn on_update(&mut self, key: EventKey, record: &EventRecord) -> Vec<TranscriptAction> {
        if !self.pending_media.contains_key(&key) {
            tracing::debug!(%key, "update for unknown or settled event");
            return vec![];
        }

        let Some(PhotoUrl::Remote(url)) = record.photo_url.as_deref().map(PhotoUrl::parse) else {
            return vec![];
        };

        if let Some(MediaState::Fetching { url: current, .. }) = self.media_state(key)
            && *current == url
        {
            return vec![];
        }

        self.start_fetch(key, url)
    }

    /// Apply a successful fetch.
    pub fn on_media_fetched(
        &mut self,
        key: EventKey,
        object: RemoteMediaObject,
    ) -> Vec<TranscriptAction> {
        let Some(&position) = self.pending_media.get(&key) else {
            tracing::debug!(%key, "discarding fetch result for settled entry");
            return vec![];
        };

        let entry = &mut self.entries[position];
        match &entry.content {
            EntryContent::Photo(MediaState::Fetching { url, .. }) if *url == object.url => {},
            _ => {
                tracing::debug!(%key, url = %object.url, "discarding stale fetch result");
                return vec![];
            },
        }

        tracing::debug!(%key, content_type = %object.content_type, "media resolved");
        entry.content = EntryContent::Photo(MediaState::Resolved(object));
        self.pending_media.remove(&key);
        vec![TranscriptAction::Render]
    }

    /// Apply a failed fetch of `url`, retrying while the budget allows.
    pub fn on_media_failed(
        &mut self,
        key: EventKey,
        url: &str,
        attempt: u32,
        error: FetchError,
    ) -> Vec<TranscriptAction> {
        let Some(&position) = self.pending_media.get(&key) else {
            return vec![];
        };

        let url = match &self.entries[position].content {
            EntryContent::Photo(MediaState::Fetching { url: current_url, attempt: current })
                if *current == attempt && current_url == url =>
            {
                current_url.clone()
            },
            _ => {
                tracing::debug!(%key, %url, attempt, "discarding stale fetch failure");
                return vec![];
            },
        };

        if error.is_transient() && attempt < self.policy.max_attempts {
            tracing::warn!(%key, attempt, %error, "media fetch failed, retrying");
            let next = attempt + 1;
            self.entries[position].content =
                EntryContent::Photo(MediaState::Fetching { url: url.clone(), attempt: next });
            return vec![
                TranscriptAction::Diagnostic(Diagnostic::MediaRetrying { key, attempt, error }),
                TranscriptAction::FetchMedia {
                    key,
                    url,
                    attempt: next,
                    delay: self.policy.retry_backoff,
                },
            ];
        }

        tracing::warn!(%key, attempts = attempt, %error, "media fetch abandoned");
        vec![TranscriptAction::Diagnostic(Diagnostic::MediaAbandoned {
            key,
            attempts: attempt,
            error,
        })]
    }

    /// Current transcript, safe to render at any time.
    pub fn current_transcript(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Owned copy of the transcript.
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries.clone()
    }

    /// Entry for a key. `None` if the key was never folded or was rejected.
    pub fn entry(&self, key: EventKey) -> Option<&TranscriptEntry> {
        self.positions.get(&key).map(|&position| &self.entries[position])
    }

    /// Number of photo entries awaiting resolution.
    pub fn pending_media_count(&self) -> usize {
        self.pending_media.len()
    }

    /// Drop all derived state. Used before replaying a fresh subscription.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.pending_media.clear();
    }

    fn push(&mut self, entry: TranscriptEntry) -> usize {
        let position = self.entries.len();
        self.positions.insert(entry.key, position);
        self.entries.push(entry);
        position
    }

    fn media_state(&self, key: EventKey) -> Option<&MediaState> {
        self.pending_media
            .get(&key)
            .and_then(|&position| self.entries[position].content.media())
    }

    fn start_fetch(&mut self, key: EventKey, url: String) -> Vec<TranscriptAction> {
        let Some(&position) = self.pending_media.get(&key) else {
            return vec![];
        };

        tracing::debug!(%key, %url, "fetching media");
        self.entries[position].content =
            EntryContent::Photo(MediaState::Fetching { url: url.clone(), attempt: 1 });
        vec![TranscriptAction::Render, TranscriptAction::FetchMedia {
            key,
            url,
            attempt: 1,
            delay: Duration::ZERO,
        }]
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn key(index: u64) -> EventKey {
        EventKey::new(index)
    }

    fn object(url: &str) -> RemoteMediaObject {
        RemoteMediaObject {
            url: url.into(),
            content_type: "image/jpeg".into(),
            bytes: Bytes::from_static(b"\xff\xd8"),
        }
    }

    fn with_url(url: &str) -> EventRecord {
        EventRecord { photo_url: Some(url.into()), ..EventRecord::photo_placeholder("u1", None) }
    }

    #[test]
    fn replayed_append_is_ignored() {
        let mut projector = TranscriptProjector::default();
        let record = EventRecord::text("u1", "Ann", "hi");

        assert_eq!(projector.on_append(key(1), &record), vec![TranscriptAction::Render]);
        assert!(projector.on_append(key(1), &record).is_empty());
        assert_eq!(projector.current_transcript().len(), 1);
    }

    #[test]
    fn empty_text_is_rejected_with_one_diagnostic() {
        let mut projector = TranscriptProjector::default();
        let actions = projector.on_append(key(1), &EventRecord::text("u1", "Ann", ""));

        assert_eq!(actions, vec![TranscriptAction::Diagnostic(Diagnostic::Rejected {
            key: key(1),
            error: DecodeError::EmptyText,
        })]);
        assert!(projector.current_transcript().is_empty());
    }

    #[test]
    fn placeholder_with_url_goes_straight_to_fetching() {
        let mut projector = TranscriptProjector::default();
        let actions = projector.on_append(key(1), &with_url("gs://bucket/a.png"));

        assert!(actions.iter().any(|a| matches!(
            a,
            TranscriptAction::FetchMedia { attempt: 1, url, .. } if url == "gs://bucket/a.png"
        )));
        assert_eq!(projector.media_state(key(1)).map(MediaState::label), Some("fetching"));
    }

    #[test]
    fn photo_without_name_falls_back_to_sender_id() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &EventRecord::photo_placeholder("u9", None));
        assert_eq!(projector.entry(key(1)).map(|e| e.display_name.as_str()), Some("u9"));
    }

    #[test]
    fn update_with_sentinel_is_ignored() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &EventRecord::photo_placeholder("u1", None));

        let actions = projector.on_update(key(1), &EventRecord::photo_placeholder("u1", None));
        assert!(actions.is_empty());
        assert_eq!(projector.media_state(key(1)), Some(&MediaState::Pending));
    }

    #[test]
    fn duplicate_update_does_not_refetch() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &EventRecord::photo_placeholder("u1", None));
        let first = projector.on_update(key(1), &with_url("gs://bucket/a.png"));
        let second = projector.on_update(key(1), &with_url("gs://bucket/a.png"));

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }

    #[test]
    fn stale_fetch_result_for_old_url_is_discarded() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &EventRecord::photo_placeholder("u1", None));
        let _ = projector.on_update(key(1), &with_url("gs://bucket/old.png"));
        let _ = projector.on_update(key(1), &with_url("gs://bucket/new.png"));

        assert!(projector.on_media_fetched(key(1), object("gs://bucket/old.png")).is_empty());
        assert_eq!(projector.on_media_fetched(key(1), object("gs://bucket/new.png")), vec![
            TranscriptAction::Render
        ]);
        assert_eq!(projector.pending_media_count(), 0);
    }

    #[test]
    fn transient_failures_retry_until_budget_spent() {
        let policy = MediaPolicy { max_attempts: 2, retry_backoff: Duration::from_millis(5) };
        let mut projector = TranscriptProjector::new(policy);
        let _ = projector.on_append(key(1), &with_url("gs://bucket/a.png"));
        let error = FetchError::Storage("reset".into());

        let retry = projector.on_media_failed(key(1), "gs://bucket/a.png", 1, error.clone());
        assert!(retry.iter().any(|a| matches!(
            a,
            TranscriptAction::FetchMedia { attempt: 2, delay, .. } if *delay == Duration::from_millis(5)
        )));

        let abandon = projector.on_media_failed(key(1), "gs://bucket/a.png", 2, error);
        assert!(matches!(abandon.as_slice(), [TranscriptAction::Diagnostic(
            Diagnostic::MediaAbandoned { attempts: 2, .. }
        )]));
        assert_eq!(
            projector.media_state(key(1)),
            Some(&MediaState::Fetching { url: "gs://bucket/a.png".into(), attempt: 2 })
        );
    }

    #[test]
    fn not_found_is_not_retried() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &with_url("gs://bucket/a.png"));

        let url = "gs://bucket/a.png";
        let actions =
            projector.on_media_failed(key(1), url, 1, FetchError::NotFound { url: url.into() });
        assert!(matches!(actions.as_slice(), [TranscriptAction::Diagnostic(
            Diagnostic::MediaAbandoned { attempts: 1, .. }
        )]));
    }

    #[test]
    fn failure_for_superseded_attempt_is_ignored() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &with_url("gs://bucket/a.png"));
        let url = "gs://bucket/a.png";
        let _ = projector.on_media_failed(key(1), url, 1, FetchError::Storage("reset".into()));

        assert!(
            projector.on_media_failed(key(1), url, 1, FetchError::Storage("late".into())).is_empty()
        );
    }

    #[test]
    fn failure_for_superseded_url_is_ignored() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &EventRecord::photo_placeholder("u1", None));
        let _ = projector.on_update(key(1), &with_url("gs://bucket/old.png"));
        let _ = projector.on_update(key(1), &with_url("gs://bucket/new.png"));

        let old = "gs://bucket/old.png";
        let not_found = projector.on_media_failed(key(1), old, 1, FetchError::NotFound {
            url: old.into(),
        });
        assert!(not_found.is_empty());
        let reset = FetchError::Storage("reset".into());
        assert!(projector.on_media_failed(key(1), old, 1, reset).is_empty());

        assert_eq!(
            projector.media_state(key(1)),
            Some(&MediaState::Fetching { url: "gs://bucket/new.png".into(), attempt: 1 })
        );
    }

    #[test]
    fn direction_follows_sender() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &EventRecord::text("u1", "Ann", "mine"));
        let _ = projector.on_append(key(2), &EventRecord::text("u2", "Bea", "theirs"));
        let local = ParticipantId::new("u1");

        let (mine, theirs) = (&projector.current_transcript()[0], &projector.current_transcript()[1]);
        assert_eq!(mine.direction(&local), Direction::Outgoing);
        assert_eq!(mine.sender_label(&local), None);
        assert_eq!(theirs.direction(&local), Direction::Incoming);
        assert_eq!(theirs.sender_label(&local), Some("Bea"));
    }

    #[test]
    fn undecodable_bytes_are_rejected() {
        let mut projector = TranscriptProjector::default();
        let actions = projector.on_append_bytes(key(3), &[0xff, 0xff]);

        assert!(matches!(actions.as_slice(), [TranscriptAction::Diagnostic(Diagnostic::Rejected {
            error: DecodeError::Malformed(_),
            ..
        })]));
        assert!(projector.on_update_bytes(key(3), &[0xff]).is_empty());
    }

    #[test]
    fn results_after_reset_are_discarded() {
        let mut projector = TranscriptProjector::default();
        let _ = projector.on_append(key(1), &with_url("gs://bucket/a.png"));
        projector.reset();

        assert!(projector.on_media_fetched(key(1), object("gs://bucket/a.png")).is_empty());
        assert!(projector.current_transcript().is_empty());
    }
}
