//! Renderer that records every frame.

use std::{
    convert::Infallible,
    sync::{Arc, Mutex, MutexGuard},
};

use murmur_client::{Renderer, SessionView};
use tokio::sync::watch;

/// Renderer that keeps every [`SessionView`] it is handed.
///
/// Clones share the same recording, so a test can keep one handle while the
/// session owns the other. Waiting helpers wake on every new frame.
#[derive(Clone)]
pub struct RecordingRenderer {
    frames: Arc<Mutex<Vec<SessionView>>>,
    /// Number of frames rendered so far.
    rendered: Arc<watch::Sender<usize>>,
}

impl RecordingRenderer {
    /// Create an empty recording.
    pub fn new() -> Self {
        let (rendered, _) = watch::channel(0);
        Self { frames: Arc::new(Mutex::new(Vec::new())), rendered: Arc::new(rendered) }
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, Vec<SessionView>> {
        self.frames.lock().expect("Mutex poisoned")
    }

    /// All frames, oldest first.
    pub fn frames(&self) -> Vec<SessionView> {
        self.lock().clone()
    }

    /// Most recent frame.
    pub fn last(&self) -> Option<SessionView> {
        self.lock().last().cloned()
    }

    /// Number of frames rendered so far.
    pub fn frame_count(&self) -> usize {
        self.lock().len()
    }

    /// Wait until the most recent frame satisfies `predicate`.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&SessionView) -> bool) -> SessionView {
        let mut changes = self.rendered.subscribe();
        loop {
            if let Some(view) = self.last().filter(|view| predicate(view)) {
                return view;
            }
            // The sender lives as long as `self`.
            let _ = changes.changed().await;
        }
    }

    /// Wait until any frame rendered at or after index `since` satisfies
    /// `predicate`. Pair with [`Self::frame_count`] to wait for a state that
    /// may be passed through quickly.
    pub async fn wait_for_since(
        &self,
        since: usize,
        mut predicate: impl FnMut(&SessionView) -> bool,
    ) -> SessionView {
        let mut changes = self.rendered.subscribe();
        loop {
            let found = self.lock().iter().skip(since).find(|view| predicate(view)).cloned();
            if let Some(view) = found {
                return view;
            }
            let _ = changes.changed().await;
        }
    }
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for RecordingRenderer {
    type Error = Infallible;

    fn render(&mut self, view: &SessionView) -> Result<(), Self::Error> {
        let count = {
            let mut frames = self.lock();
            frames.push(view.clone());
            frames.len()
        };
        self.rendered.send_replace(count);
        Ok(())
    }
}
