//! Scenario driver: one in-process backend, any number of sessions.
//!
//! The test plays every remote participant by writing to the
//! [`MemoryBackend`] directly, while the session under test runs as a
//! spawned task and reports through a [`RecordingRenderer`].

use bytes::Bytes;
use murmur_client::{
    BlobStore, ChannelSession, EventLogClient, MemoryBackend, SessionCommand, SessionError,
    SessionView, Services,
};
use murmur_core::SessionConfig;
use murmur_proto::{ChannelId, EventKey, EventRecord, FieldDelta, ParticipantId, PresenceEntry};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{RecordingRenderer, SimEnv};

/// Command buffer between a test and its session.
const COMMAND_BUFFER: usize = 16;

/// Shared backend plus the channel under test.
#[derive(Clone)]
pub struct Scenario {
    /// Backend every participant talks to.
    pub backend: MemoryBackend,
    /// Channel under test.
    pub channel: ChannelId,
    seed: u64,
}

impl Scenario {
    /// Scenario on `channel` with a fresh backend.
    pub fn new(channel: &str) -> Self {
        Self { backend: MemoryBackend::new(), channel: ChannelId::new(channel), seed: 0 }
    }

    /// Seed for the environments of sessions spawned from here on.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Default configuration for a participant.
    pub fn config(participant: &str, display_name: &str) -> SessionConfig {
        SessionConfig::new(ParticipantId::new(participant), display_name)
    }

    /// Spawn a session that fetches media from the backend itself.
    pub fn spawn(&self, config: SessionConfig) -> RunningSession {
        self.spawn_with_blobs(config, self.backend.clone())
    }

    /// Spawn a session fetching media through `blobs`.
    pub fn spawn_with_blobs<B: BlobStore>(&self, config: SessionConfig, blobs: B) -> RunningSession {
        let renderer = RecordingRenderer::new();
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);

        let services =
            Services { log: self.backend.clone(), presence: self.backend.clone(), blobs };
        let session = ChannelSession::new(
            services,
            SimEnv::with_seed(self.seed),
            renderer.clone(),
            config,
            self.channel.clone(),
        );
        let remote_config = self.backend.clone();
        let handle = tokio::spawn(async move {
            session.with_remote_theme(&remote_config).await.run(receiver).await
        });

        RunningSession { commands, handle, renderer }
    }

    /// Append an encoded record as some remote participant would.
    ///
    /// # Panics
    ///
    /// Panics if the backend refuses the append.
    #[allow(clippy::expect_used)]
    pub async fn append(&self, record: &EventRecord) -> EventKey {
        let bytes = Bytes::from(record.encode().expect("record encodes"));
        self.backend.append(&self.channel, bytes).await.expect("append accepted")
    }

    /// Append a text message.
    pub async fn append_text(&self, sender_id: &str, sender_name: &str, text: &str) -> EventKey {
        self.append(&EventRecord::text(sender_id, sender_name, text)).await
    }

    /// Append a photo placeholder with the `NOTSET` sentinel.
    pub async fn append_placeholder(&self, sender_id: &str, sender_name: Option<&str>) -> EventKey {
        self.append(&EventRecord::photo_placeholder(sender_id, sender_name.map(str::to_owned)))
            .await
    }

    /// Point a placeholder at its uploaded image.
    ///
    /// # Panics
    ///
    /// Panics if the backend refuses the update.
    #[allow(clippy::expect_used)]
    pub async fn resolve_placeholder(&self, key: EventKey, url: &str) {
        self.backend
            .update_field(&self.channel, key, FieldDelta::PhotoUrl(url.to_owned()))
            .await
            .expect("update accepted");
    }

    /// Current typing entries held by the presence store.
    pub fn presence(&self) -> Vec<PresenceEntry> {
        self.backend.presence(&self.channel)
    }
}

/// A session running as a spawned task.
pub struct RunningSession {
    commands: mpsc::Sender<SessionCommand>,
    handle: JoinHandle<Result<SessionView, SessionError>>,
    /// Frames the session rendered.
    pub renderer: RecordingRenderer,
}

impl RunningSession {
    /// Send a command to the session.
    ///
    /// # Panics
    ///
    /// Panics if the session has already ended.
    #[allow(clippy::expect_used)]
    pub async fn command(&self, command: SessionCommand) {
        self.commands.send(command).await.expect("session is running");
    }

    /// Wait until the latest rendered frame satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl FnMut(&SessionView) -> bool) -> SessionView {
        self.renderer.wait_for(predicate).await
    }

    /// Leave the channel and return the final view.
    ///
    /// # Errors
    ///
    /// Returns the session's error if it ended abnormally.
    pub async fn leave(self) -> Result<SessionView, SessionError> {
        // The session may already be gone; the join below reports why.
        let _ = self.commands.send(SessionCommand::Leave).await;
        self.join().await
    }

    /// Wait for the session to end on its own.
    ///
    /// # Errors
    ///
    /// Returns the session's error if it ended abnormally.
    pub async fn join(self) -> Result<SessionView, SessionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(error) => std::panic::resume_unwind(error.into_panic()),
        }
    }
}
