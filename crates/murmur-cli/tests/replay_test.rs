//! Script replay through a live session.

use std::time::Duration;

use murmur_cli::{ReplayError, ReplayOptions, Script, replay};
use murmur_core::{Diagnostic, SessionConfig, Theme};
use murmur_proto::{ChannelId, ParticipantId};

fn options() -> ReplayOptions {
    ReplayOptions {
        channel: ChannelId::new("general"),
        session: SessionConfig::new(ParticipantId::new("u2"), "Bea"),
        settle: Duration::from_secs(5),
    }
}

#[tokio::test(start_paused = true)]
async fn replays_text_photo_and_typing() {
    let script = Script::from_json(
        r#"{
            "config": { "bubble_theme": "dark" },
            "blobs": [{ "url": "gs://bucket/img.jpg", "content_type": "image/jpeg", "data": "jpeg" }],
            "steps": [
                { "append": { "senderId": "u1", "senderName": "Ann", "text": "hi" } },
                { "append": { "senderId": "u1", "senderName": "Ann", "photoURL": "NOTSET" } },
                { "update": { "key": 1, "photoURL": "gs://bucket/img.jpg" } },
                { "typing": { "participant": "u1", "is_typing": true } },
                { "send": "hello Ann" }
            ]
        }"#,
    )
    .unwrap();

    let view = replay(&script, options(), None::<Vec<u8>>).await.unwrap();

    // Presence is cleared on leave, so the final view shows nobody typing.
    assert_eq!(view.theme, Theme::Dark);
    assert!(!view.others_typing);
    assert_eq!(
        view.to_text(),
        "#0 Ann: hi\n#1 Ann: [photo image/jpeg 4 bytes Static]\n#2 > hello Ann\n"
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_records_show_up_as_diagnostics() {
    let script = Script::from_json(
        r#"{ "steps": [
            { "append": { "senderId": "u1", "senderName": "Ann", "text": "" } },
            { "append": { "senderName": "Ann", "text": "who am I" } }
        ] }"#,
    )
    .unwrap();

    let view = replay(&script, options(), None::<Vec<u8>>).await.unwrap();

    assert!(view.transcript.is_empty());
    assert_eq!(view.diagnostics.len(), 2);
    assert!(view.diagnostics.iter().all(|d| matches!(d, Diagnostic::Rejected { .. })));
}

#[tokio::test(start_paused = true)]
async fn update_of_missing_event_fails_the_step() {
    let script =
        Script::from_json(r#"{ "steps": [{ "update": { "key": 7, "photoURL": "gs://x" } }] }"#)
            .unwrap();

    let result = replay(&script, options(), None::<Vec<u8>>).await;

    assert!(matches!(result, Err(ReplayError::Step { step: 0, .. })));
}

#[tokio::test(start_paused = true)]
async fn follow_mode_echoes_frames() {
    let script = Script::from_json(
        r#"{ "steps": [{ "append": { "senderId": "u1", "senderName": "Ann", "text": "hi" } }] }"#,
    )
    .unwrap();

    // The echo sink is moved into the session; only the result is observable.
    let view = replay(&script, options(), Some(std::io::sink())).await.unwrap();
    assert_eq!(view.transcript.len(), 1);
}
