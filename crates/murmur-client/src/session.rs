//! Per-channel session runtime.
//!
//! [`ChannelSession`] is the single owner of a channel's projections. It
//! drives one `tokio::select!` loop over:
//!
//! - appends and updates from the log subscription
//! - presence snapshots
//! - completions of spawned media fetches and sends (mpsc back-channels)
//! - [`SessionCommand`]s from the UI
//!
//! Each input is folded to completion before the next is taken, so the
//! projections are never touched concurrently. Spawned tasks only ever talk
//! back through the channels; their results carry enough context (key,
//! attempt, generation) to be discarded when they no longer apply.

use std::collections::VecDeque;

use bytes::Bytes;
use murmur_core::{
    Diagnostic, FetchError, LocalId, Outbox, OutboxEntry, OutgoingMessage, PresenceAction,
    PresenceTracker, RemoteMediaObject, SessionConfig, Theme, TranscriptAction, TranscriptEvent,
    TranscriptProjector, env::Environment,
};
use murmur_proto::{ChannelId, EventKey, EventRecord, FieldDelta, PresenceEntry};
use tokio::sync::mpsc;

use crate::{
    Renderer, SessionCommand, SessionView,
    backend::{
        BlobStore, ConfigSource, EventLogClient, LogEvent, PresenceStore, PresenceWatch,
        Subscription, resolve_theme,
    },
    error::{SessionError, TransportError},
};

/// Diagnostics kept for the view.
const MAX_DIAGNOSTICS: usize = 64;

/// Backend handles a session talks to.
#[derive(Debug, Clone)]
pub struct Services<L, P, B> {
    /// Event log.
    pub log: L,
    /// Presence store.
    pub presence: P,
    /// Blob store for message media.
    pub blobs: B,
}

/// Completion of a spawned media fetch.
struct MediaResult {
    /// Subscription generation the fetch was started under.
    generation: u64,
    key: EventKey,
    url: String,
    attempt: u32,
    result: Result<RemoteMediaObject, FetchError>,
}

/// Progress report of a spawned send.
enum SendOutcome {
    /// Photo placeholder is in the log; a retry must not append it again.
    PlaceholderAppended { local_id: LocalId, key: EventKey },
    /// The log accepted the message.
    Accepted { local_id: LocalId, key: EventKey },
    /// The log or blob store refused.
    Failed { local_id: LocalId, error: TransportError },
}

/// One input taken from the select loop.
enum Step {
    Append(Option<LogEvent>),
    Update(Option<LogEvent>),
    Presence(Option<Vec<PresenceEntry>>),
    Media(MediaResult),
    Send(SendOutcome),
    Command(Option<SessionCommand>),
}

/// Whether the loop keeps going.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Runtime for one channel: keeps the transcript and typing indicator in sync
/// with the backend and renders after every change.
///
/// # Type Parameters
///
/// - `L`: event log
/// - `P`: presence store
/// - `B`: blob store
/// - `E`: environment (time, randomness)
/// - `R`: rendering surface
pub struct ChannelSession<L, P, B, E, R>
where
    L: EventLogClient,
    P: PresenceStore,
    B: BlobStore,
    E: Environment,
    R: Renderer,
{
    services: Services<L, P, B>,
    env: E,
    renderer: R,
    config: SessionConfig,
    channel: ChannelId,
    theme: Theme,

    transcript: TranscriptProjector,
    presence: PresenceTracker,
    outbox: Outbox,
    diagnostics: VecDeque<Diagnostic>,

    /// Bumped on every resubscribe. Fetches started under an older
    /// generation are stale.
    generation: u64,

    media_tx: mpsc::UnboundedSender<MediaResult>,
    media_rx: mpsc::UnboundedReceiver<MediaResult>,
    send_tx: mpsc::UnboundedSender<SendOutcome>,
    send_rx: mpsc::UnboundedReceiver<SendOutcome>,
}

impl<L, P, B, E, R> ChannelSession<L, P, B, E, R>
where
    L: EventLogClient,
    P: PresenceStore,
    B: BlobStore,
    E: Environment,
    R: Renderer,
{
    /// Create a session for `channel` using the configured default theme.
    pub fn new(
        services: Services<L, P, B>,
        env: E,
        renderer: R,
        config: SessionConfig,
        channel: ChannelId,
    ) -> Self {
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (send_tx, send_rx) = mpsc::unbounded_channel();

        Self {
            transcript: TranscriptProjector::new(config.media),
            presence: PresenceTracker::new(config.local_participant.clone()),
            outbox: Outbox::new(),
            diagnostics: VecDeque::new(),
            theme: config.default_theme,
            generation: 0,
            services,
            env,
            renderer,
            config,
            channel,
            media_tx,
            media_rx,
            send_tx,
            send_rx,
        }
    }

    /// Pick the theme from remote config, keeping the default on failure.
    pub async fn with_remote_theme<C: ConfigSource>(mut self, source: &C) -> Self {
        self.theme = resolve_theme(source, self.config.default_theme).await;
        self
    }

    /// Theme this session renders with.
    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Run until [`SessionCommand::Leave`], the command channel closes, or the
    /// log subscription ends. Returns the final view.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Transport`] if the initial or a repeated subscribe
    ///   fails
    /// - [`SessionError::Render`] if the renderer fails
    ///
    /// Teardown (unsubscribe, unwatch, clear presence) runs in every case
    /// once the subscription exists.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<SessionView, SessionError> {
        let mut subscription =
            self.services.log.subscribe(&self.channel, self.config.since_limit).await?;
        tracing::info!(channel = %self.channel, theme = %self.theme, "session started");

        let mut watch = match self.services.presence.watch_typing(&self.channel).await {
            Ok(watch) => Some(watch),
            Err(error) => {
                tracing::warn!(channel = %self.channel, %error, "typing indicator unavailable");
                None
            },
        };

        let actions = self.presence.on_session_start();
        self.apply_presence_actions(actions).await;

        let result = match self.render() {
            Ok(()) => self.event_loop(&mut subscription, &mut watch, &mut commands).await,
            Err(error) => Err(error),
        };

        self.teardown(&subscription, watch.as_ref()).await;
        tracing::info!(channel = %self.channel, "session ended");

        result.map(|()| self.view())
    }

    /// Render-ready snapshot of the current state.
    pub fn view(&self) -> SessionView {
        let failed_sends: Vec<OutboxEntry> = self.outbox.failed().cloned().collect();

        SessionView {
            channel: self.channel.clone(),
            local_participant: self.config.local_participant.clone(),
            transcript: self.transcript.current_transcript().to_vec(),
            others_typing: self.presence.others_typing(),
            typing: self.presence.typing_participants().into_iter().cloned().collect(),
            theme: self.theme,
            pending_media: self.transcript.pending_media_count(),
            sending: self.outbox.len() - failed_sends.len(),
            failed_sends,
            diagnostics: self.diagnostics.iter().cloned().collect(),
        }
    }

    async fn event_loop(
        &mut self,
        subscription: &mut Subscription,
        watch: &mut Option<PresenceWatch>,
        commands: &mut mpsc::Receiver<SessionCommand>,
    ) -> Result<(), SessionError> {
        loop {
            // Appends before updates: an update is only meaningful once its
            // append was folded, and the log enqueues the append first.
            let step = tokio::select! {
                biased;
                event = subscription.appends.recv() => Step::Append(event),
                event = subscription.updates.recv() => Step::Update(event),
                snapshot = next_snapshot(watch) => Step::Presence(snapshot),
                Some(result) = self.media_rx.recv() => Step::Media(result),
                Some(outcome) = self.send_rx.recv() => Step::Send(outcome),
                command = commands.recv() => Step::Command(command),
            };

            let flow = match step {
                Step::Append(Some(event)) => {
                    let actions = self.transcript.on_append_bytes(event.key, &event.record);
                    self.apply_transcript_actions(actions)?;
                    Flow::Continue
                },
                Step::Update(Some(event)) => {
                    let actions = self.transcript.on_update_bytes(event.key, &event.record);
                    self.apply_transcript_actions(actions)?;
                    Flow::Continue
                },
                Step::Append(None) | Step::Update(None) => {
                    tracing::info!(channel = %self.channel, "log subscription closed");
                    Flow::Stop
                },
                Step::Presence(Some(snapshot)) => {
                    let actions = self.presence.on_presence_snapshot(snapshot);
                    if self.apply_presence_actions(actions).await {
                        self.render()?;
                    }
                    Flow::Continue
                },
                Step::Presence(None) => {
                    tracing::warn!(channel = %self.channel, "presence watch closed");
                    *watch = None;
                    Flow::Continue
                },
                Step::Media(result) => {
                    self.on_media_result(result)?;
                    Flow::Continue
                },
                Step::Send(outcome) => {
                    self.on_send_outcome(outcome)?;
                    Flow::Continue
                },
                Step::Command(Some(command)) => self.on_command(command, subscription).await?,
                Step::Command(None) => Flow::Stop,
            };

            if flow == Flow::Stop {
                return Ok(());
            }
        }
    }

    async fn on_command(
        &mut self,
        command: SessionCommand,
        subscription: &mut Subscription,
    ) -> Result<Flow, SessionError> {
        match command {
            SessionCommand::SendText(text) => {
                self.send(OutgoingMessage::Text(text)).await?;
            },
            SessionCommand::SendPhoto { bytes, content_type } => {
                self.send(OutgoingMessage::Photo { bytes, content_type }).await?;
            },
            SessionCommand::SetTyping(is_typing) => {
                let actions = self.presence.set_local_typing(is_typing);
                self.apply_presence_actions(actions).await;
            },
            SessionCommand::ComposerChanged(text) => {
                let actions = self.presence.on_composer_changed(&text);
                self.apply_presence_actions(actions).await;
            },
            SessionCommand::RetryFailed(local_id) => match self.outbox.retry(local_id) {
                Some(entry) => {
                    tracing::info!(%local_id, "retrying send");
                    self.spawn_send(entry);
                    self.render()?;
                },
                None => tracing::debug!(%local_id, "nothing to retry"),
            },
            SessionCommand::Resubscribe => self.resubscribe(subscription).await?,
            SessionCommand::Leave => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    /// Drop derived state and replay the log from scratch.
    async fn resubscribe(&mut self, subscription: &mut Subscription) -> Result<(), SessionError> {
        self.services.log.unsubscribe(subscription.id).await;

        self.generation += 1;
        self.transcript.reset();
        tracing::info!(channel = %self.channel, generation = self.generation, "resubscribing");

        *subscription =
            self.services.log.subscribe(&self.channel, self.config.since_limit).await?;
        self.render()
    }

    fn on_media_result(&mut self, result: MediaResult) -> Result<(), SessionError> {
        let MediaResult { generation, key, url, attempt, result } = result;
        if generation != self.generation {
            tracing::debug!(%key, attempt, generation, "discarding fetch from previous subscription");
            return Ok(());
        }

        let event = match result {
            Ok(object) => TranscriptEvent::MediaFetched { key, object },
            Err(error) => TranscriptEvent::MediaFailed { key, url, attempt, error },
        };
        let actions = self.transcript.handle(event);
        self.apply_transcript_actions(actions)
    }

    fn on_send_outcome(&mut self, outcome: SendOutcome) -> Result<(), SessionError> {
        match outcome {
            SendOutcome::PlaceholderAppended { local_id, key } => {
                self.outbox.set_placeholder(local_id, key);
                Ok(())
            },
            SendOutcome::Accepted { local_id, key } => {
                tracing::debug!(%local_id, %key, "send accepted");
                self.outbox.mark_accepted(local_id);
                self.render()
            },
            SendOutcome::Failed { local_id, error } => {
                tracing::warn!(%local_id, %error, "message failed to send");
                self.outbox.mark_failed(local_id, error.to_string());
                self.render()
            },
        }
    }

    /// Stage and spawn a send. The composer empties on send, so the local
    /// typing flag is cleared.
    async fn send(&mut self, message: OutgoingMessage) -> Result<(), SessionError> {
        let local_id = self.outbox.stage(&self.env, message);
        if let Some(entry) = self.outbox.get(local_id).cloned() {
            self.spawn_send(entry);
        }

        let actions = self.presence.on_message_sent();
        self.apply_presence_actions(actions).await;
        self.render()
    }

    fn apply_transcript_actions(
        &mut self,
        actions: Vec<TranscriptAction>,
    ) -> Result<(), SessionError> {
        let mut needs_render = false;

        for action in actions {
            match action {
                TranscriptAction::Render => needs_render = true,
                TranscriptAction::FetchMedia { key, url, attempt, delay } => {
                    self.spawn_fetch(key, url, attempt, delay);
                },
                TranscriptAction::Diagnostic(diagnostic) => {
                    tracing::warn!(channel = %self.channel, ?diagnostic, "transcript diagnostic");
                    if self.diagnostics.len() == MAX_DIAGNOSTICS {
                        self.diagnostics.pop_front();
                    }
                    self.diagnostics.push_back(diagnostic);
                    needs_render = true;
                },
            }
        }

        if needs_render { self.render() } else { Ok(()) }
    }

    /// Execute presence actions. Store failures are logged only. Returns
    /// whether a redraw was requested.
    async fn apply_presence_actions(&mut self, actions: Vec<PresenceAction>) -> bool {
        let mut needs_render = false;
        let presence = &self.services.presence;

        for action in actions {
            let (what, result) = match action {
                PresenceAction::WriteTyping { participant, is_typing } => (
                    "write typing flag",
                    presence.set_typing(&self.channel, &participant, is_typing).await,
                ),
                PresenceAction::RegisterDisconnectCleanup { participant } => (
                    "register disconnect cleanup",
                    presence.register_disconnect_cleanup(&self.channel, &participant).await,
                ),
                PresenceAction::ClearPresence { participant } => {
                    ("clear presence", presence.clear(&self.channel, &participant).await)
                },
                PresenceAction::Render => {
                    needs_render = true;
                    continue;
                },
            };

            if let Err(error) = result {
                tracing::warn!(channel = %self.channel, %error, "failed to {}", what);
            }
        }
        needs_render
    }

    fn spawn_fetch(&self, key: EventKey, url: String, attempt: u32, delay: std::time::Duration) {
        let blobs = self.services.blobs.clone();
        let env = self.env.clone();
        let results = self.media_tx.clone();
        let timeout = self.config.media_timeout;
        let generation = self.generation;

        tracing::debug!(%key, attempt, %url, ?delay, "fetching media");
        tokio::spawn(async move {
            if !delay.is_zero() {
                env.sleep(delay).await;
            }

            let started = env.now();
            let result = match tokio::time::timeout(timeout, blobs.fetch(&url)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout { elapsed: env.now() - started }),
            };

            // The session may have ended; nothing is waiting for this result.
            let _ = results.send(MediaResult { generation, key, url, attempt, result });
        });
    }

    fn spawn_send(&self, entry: OutboxEntry) {
        let log = self.services.log.clone();
        let blobs = self.services.blobs.clone();
        let channel = self.channel.clone();
        let sender_id = self.config.local_participant.as_str().to_owned();
        let sender_name = self.config.display_name.clone();
        let outcomes = self.send_tx.clone();

        tokio::spawn(async move {
            let local_id = entry.local_id;
            let result = match entry.message {
                OutgoingMessage::Text(text) => {
                    let record = EventRecord::text(sender_id, sender_name, text);
                    append_record(&log, &channel, &record).await
                },
                OutgoingMessage::Photo { bytes, content_type } => {
                    let placeholder = match entry.placeholder {
                        Some(key) => Ok(key),
                        None => {
                            let record =
                                EventRecord::photo_placeholder(sender_id, Some(sender_name));
                            let appended = append_record(&log, &channel, &record).await;
                            if let Ok(key) = appended {
                                let _ = outcomes
                                    .send(SendOutcome::PlaceholderAppended { local_id, key });
                            }
                            appended
                        },
                    };
                    match placeholder {
                        Ok(key) => {
                            resolve_photo(&log, &blobs, &channel, key, bytes, &content_type).await
                        },
                        Err(error) => Err(error),
                    }
                },
            };

            let outcome = match result {
                Ok(key) => SendOutcome::Accepted { local_id, key },
                Err(error) => SendOutcome::Failed { local_id, error },
            };
            let _ = outcomes.send(outcome);
        });
    }

    fn render(&mut self) -> Result<(), SessionError> {
        let view = self.view();
        self.renderer.render(&view).map_err(|error| SessionError::Render(error.to_string()))
    }

    async fn teardown(&mut self, subscription: &Subscription, watch: Option<&PresenceWatch>) {
        self.services.log.unsubscribe(subscription.id).await;
        if let Some(watch) = watch {
            self.services.presence.unwatch(watch.id).await;
        }

        let actions = self.presence.on_session_end();
        self.apply_presence_actions(actions).await;
    }
}

/// Next presence snapshot, or never if there is no watch.
async fn next_snapshot(watch: &mut Option<PresenceWatch>) -> Option<Vec<PresenceEntry>> {
    match watch {
        Some(watch) => watch.snapshots.recv().await,
        None => std::future::pending().await,
    }
}

async fn append_record<L: EventLogClient>(
    log: &L,
    channel: &ChannelId,
    record: &EventRecord,
) -> Result<EventKey, TransportError> {
    let bytes = Bytes::from(record.encode()?);
    log.append(channel, bytes).await
}

/// Second half of the photo send: upload, then point the placeholder at the
/// upload URL.
async fn resolve_photo<L: EventLogClient, B: BlobStore>(
    log: &L,
    blobs: &B,
    channel: &ChannelId,
    key: EventKey,
    bytes: Bytes,
    content_type: &str,
) -> Result<EventKey, TransportError> {
    let url = blobs.upload(bytes, content_type).await?;
    log.update_field(channel, key, FieldDelta::PhotoUrl(url)).await?;
    Ok(key)
}
