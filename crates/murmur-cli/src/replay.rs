//! Script replay against an in-process backend.

use std::{io::Write, time::Duration};

use bytes::Bytes;
use murmur_client::{
    ChannelSession, EventLogClient, MemoryBackend, PresenceStore, SessionCommand, SessionView,
    Services, SystemEnv, TransportError,
};
use murmur_core::SessionConfig;
use murmur_proto::{ChannelId, EventKey, FieldDelta, ParticipantId};
use tokio::sync::{mpsc, watch};

use crate::{
    error::ReplayError,
    script::{Script, Step},
    text_renderer::TextRenderer,
};

/// Command buffer between the replay and its session.
const COMMAND_BUFFER: usize = 32;

/// Time without new frames after which the channel counts as quiet.
const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// How to run a replay.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Channel the script plays in.
    pub channel: ChannelId,
    /// Session settings for the local participant.
    pub session: SessionConfig,
    /// Upper bound on waiting for media and sends to finish after the last
    /// step.
    pub settle: Duration,
}

/// Replay `script` and return the final view.
///
/// The session starts first; steps then run in order, so the session sees
/// them live. After the last step the replay waits until no media fetch or
/// send is outstanding and no frame arrived for a short quiet period, bounded
/// by `options.settle`, then leaves.
///
/// # Errors
///
/// - [`ReplayError::Step`] if the backend refuses a scripted write
/// - [`ReplayError::Session`] if the session fails
/// - [`ReplayError::Join`] if the session task dies
pub async fn replay<W>(
    script: &Script,
    options: ReplayOptions,
    echo: Option<W>,
) -> Result<SessionView, ReplayError>
where
    W: Write + Send + 'static,
{
    let backend = MemoryBackend::new();
    if !script.config.is_empty() {
        backend.set_remote_config(script.config.clone());
    }
    for blob in &script.blobs {
        backend.insert_blob(blob.url.clone(), blob.content_type.clone(), blob.bytes());
    }

    let renderer = TextRenderer::new(echo);
    let mut views = renderer.subscribe();
    let services =
        Services { log: backend.clone(), presence: backend.clone(), blobs: backend.clone() };
    let session = ChannelSession::new(
        services,
        SystemEnv::default(),
        renderer,
        options.session,
        options.channel.clone(),
    )
    .with_remote_theme(&backend)
    .await;

    let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
    let handle = tokio::spawn(session.run(receiver));

    for (index, step) in script.steps.iter().enumerate() {
        tracing::debug!(index, ?step, "applying script step");
        apply(&backend, &options.channel, &commands, step)
            .await
            .map_err(|source| ReplayError::Step { step: index, source })?;
    }

    if tokio::time::timeout(options.settle, settle(&mut views)).await.is_err() {
        tracing::warn!(settle = ?options.settle, "channel did not settle, leaving anyway");
    }

    // A session that already ended reports why through the join below.
    let _ = commands.send(SessionCommand::Leave).await;
    let view = handle.await.map_err(|error| ReplayError::Join(error.to_string()))??;
    Ok(view)
}

async fn apply(
    backend: &MemoryBackend,
    channel: &ChannelId,
    commands: &mpsc::Sender<SessionCommand>,
    step: &Step,
) -> Result<(), TransportError> {
    match step {
        Step::Append(record) => {
            backend.append(channel, Bytes::from(record.encode()?)).await?;
        },
        Step::Update { key, photo_url } => {
            let delta = FieldDelta::PhotoUrl(photo_url.clone());
            backend.update_field(channel, EventKey::new(*key), delta).await?;
        },
        Step::Typing { participant, is_typing } => {
            let participant = ParticipantId::new(participant.as_str());
            backend.set_typing(channel, &participant, *is_typing).await?;
        },
        Step::Disconnect { participant } => {
            backend.disconnect(&ParticipantId::new(participant.as_str()));
        },
        Step::Send(text) => command(commands, SessionCommand::SendText(text.clone())).await?,
        Step::SetTyping(is_typing) => command(commands, SessionCommand::SetTyping(*is_typing)).await?,
        Step::Compose(text) => {
            command(commands, SessionCommand::ComposerChanged(text.clone())).await?;
        },
        Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
    Ok(())
}

async fn command(
    commands: &mpsc::Sender<SessionCommand>,
    command: SessionCommand,
) -> Result<(), TransportError> {
    commands.send(command).await.map_err(|_| TransportError::Closed)
}

/// Wait until nothing is outstanding and the session has been quiet for
/// [`QUIET_PERIOD`].
async fn settle(views: &mut watch::Receiver<Option<SessionView>>) {
    loop {
        match tokio::time::timeout(QUIET_PERIOD, views.changed()).await {
            Ok(Ok(())) => continue,
            // Session gone, nothing more will change.
            Ok(Err(_)) => return,
            Err(_) => {
                let idle = views
                    .borrow()
                    .as_ref()
                    .is_some_and(|view| view.pending_media == 0 && view.sending == 0);
                if idle {
                    return;
                }
            },
        }
    }
}
