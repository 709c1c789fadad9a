//! Fuzz target for the transcript fold
//!
//! Drives a `TranscriptProjector` with arbitrary interleavings of appends,
//! updates, fetch results and resets, as a misbehaving log or a slow blob
//! store could produce them.
//!
//! # Invariants
//!
//! - NEVER panic
//! - Each key yields at most one entry, in first-arrival order
//! - The pending media count equals the number of unresolved photo entries
//! - A `FetchMedia` action never exceeds the attempt budget

#![no_main]

use std::{collections::HashSet, time::Duration};

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use murmur_core::{
    FetchError, MediaPolicy, MediaState, RemoteMediaObject, TranscriptAction, TranscriptEvent,
    TranscriptProjector,
};
use murmur_proto::{EventKey, EventRecord};

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    AppendText { key: u8, text: String },
    AppendPhoto { key: u8, url: Option<u8> },
    AppendRaw { key: u8, bytes: Vec<u8> },
    Update { key: u8, url: u8 },
    Fetched { key: u8, url: u8 },
    Failed { key: u8, url: u8, attempt: u8, transient: bool },
    Reset,
}

fn url(n: u8) -> String {
    format!("gs://bucket/{}.png", n % 4)
}

fuzz_target!(|ops: Vec<Op>| {
    let policy = MediaPolicy { max_attempts: 3, retry_backoff: Duration::from_millis(1) };
    let mut projector = TranscriptProjector::new(policy);
    let mut arrival: Vec<EventKey> = Vec::new();

    for op in ops {
        let actions = match op {
            Op::AppendText { key, text } => {
                let record = EventRecord::text("u1", "Ann", text);
                projector.on_append(EventKey::new(key.into()), &record)
            },
            Op::AppendPhoto { key, url: target } => {
                let mut record = EventRecord::photo_placeholder("u1", None);
                if let Some(n) = target {
                    record.photo_url = Some(url(n));
                }
                projector.on_append(EventKey::new(key.into()), &record)
            },
            Op::AppendRaw { key, bytes } => {
                projector.on_append_bytes(EventKey::new(key.into()), &bytes)
            },
            Op::Update { key, url: target } => {
                let mut record = EventRecord::photo_placeholder("u1", None);
                record.photo_url = Some(url(target));
                projector.on_update(EventKey::new(key.into()), &record)
            },
            Op::Fetched { key, url: target } => {
                let object = RemoteMediaObject {
                    url: url(target),
                    content_type: "image/png".into(),
                    bytes: Bytes::from_static(b"png"),
                };
                projector.handle(TranscriptEvent::MediaFetched { key: EventKey::new(key.into()), object })
            },
            Op::Failed { key, url: target, attempt, transient } => {
                let error = if transient {
                    FetchError::Storage("reset".into())
                } else {
                    FetchError::NotFound { url: url(0) }
                };
                projector.handle(TranscriptEvent::MediaFailed {
                    key: EventKey::new(key.into()),
                    url: url(target),
                    attempt: u32::from(attempt % 5),
                    error,
                })
            },
            Op::Reset => {
                projector.reset();
                arrival.clear();
                Vec::new()
            },
        };

        for action in &actions {
            if let TranscriptAction::FetchMedia { attempt, .. } = action {
                assert!((1..=policy.max_attempts).contains(attempt), "attempt {attempt} out of budget");
            }
        }

        let transcript = projector.current_transcript();
        for entry in transcript {
            if !arrival.contains(&entry.key) {
                arrival.push(entry.key);
            }
        }

        let keys: Vec<_> = transcript.iter().map(|e| e.key).collect();
        assert_eq!(keys, arrival, "entries left arrival order");
        assert_eq!(keys.iter().collect::<HashSet<_>>().len(), keys.len(), "duplicate key");

        let unresolved = transcript
            .iter()
            .filter_map(|e| e.content.media())
            .filter(|state| !matches!(state, MediaState::Resolved(_)))
            .count();
        assert_eq!(projector.pending_media_count(), unresolved);
    }
});
