//! Session lifecycle against the in-process backend.

use std::{fmt, time::Duration};

use bytes::Bytes;
use murmur_client::{
    ChannelSession, EventLogClient, MemoryBackend, Renderer, SessionCommand, SessionError,
    SessionView, Services, SystemEnv,
};
use murmur_core::SessionConfig;
use murmur_proto::{ChannelId, EventRecord, ParticipantId};
use tokio::sync::mpsc;

#[derive(Debug)]
struct SurfaceLost;

impl fmt::Display for SurfaceLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("surface lost")
    }
}

impl std::error::Error for SurfaceLost {}

/// Renders successfully `budget` times, then fails.
struct FlakyRenderer {
    budget: usize,
}

impl Renderer for FlakyRenderer {
    type Error = SurfaceLost;

    fn render(&mut self, _view: &SessionView) -> Result<(), Self::Error> {
        if self.budget == 0 {
            return Err(SurfaceLost);
        }
        self.budget -= 1;
        Ok(())
    }
}

fn session(
    backend: &MemoryBackend,
    renderer: FlakyRenderer,
) -> ChannelSession<MemoryBackend, MemoryBackend, MemoryBackend, SystemEnv, FlakyRenderer> {
    let services =
        Services { log: backend.clone(), presence: backend.clone(), blobs: backend.clone() };
    let config = SessionConfig::new(ParticipantId::new("u1"), "Ann");
    ChannelSession::new(services, SystemEnv::default(), renderer, config, ChannelId::new("general"))
}

#[tokio::test]
async fn render_failure_ends_the_session_and_tears_down() {
    let backend = MemoryBackend::new();
    let channel = ChannelId::new("general");
    let record = Bytes::from(EventRecord::text("u2", "Bea", "hi").encode().unwrap());
    backend.append(&channel, record).await.unwrap();

    // The first render (empty view) succeeds, the replayed append fails.
    let (_commands, receiver) = mpsc::channel(4);
    let result = session(&backend, FlakyRenderer { budget: 1 }).run(receiver).await;

    assert!(matches!(result, Err(SessionError::Render(ref message)) if message == "surface lost"));
    assert_eq!(backend.subscriber_count(), 0);
    assert_eq!(backend.watcher_count(), 0);
}

#[tokio::test]
async fn closing_the_command_channel_ends_the_session() {
    let backend = MemoryBackend::new();
    let (commands, receiver) = mpsc::channel(4);
    let task = tokio::spawn(session(&backend, FlakyRenderer { budget: usize::MAX }).run(receiver));

    commands.send(SessionCommand::SetTyping(true)).await.unwrap();
    drop(commands);

    let view = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
    assert!(view.transcript.is_empty());
    assert!(backend.presence(&ChannelId::new("general")).is_empty());
    assert_eq!(backend.subscriber_count(), 0);
}

#[tokio::test]
async fn default_theme_is_kept_without_remote_config() {
    let backend = MemoryBackend::new();
    let session = session(&backend, FlakyRenderer { budget: usize::MAX })
        .with_remote_theme(&backend)
        .await;
    assert_eq!(session.theme(), SessionConfig::new(ParticipantId::new("u1"), "Ann").default_theme);
}
