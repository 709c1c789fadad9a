//! Text rendering for the terminal.

use std::io::{self, Write};

use murmur_client::{Renderer, SessionView};
use tokio::sync::watch;

/// Renderer that publishes every view and optionally prints it.
///
/// The latest view is observable through [`TextRenderer::subscribe`], which is
/// how the replay knows when the channel has settled.
pub struct TextRenderer<W: Write + Send> {
    out: Option<W>,
    latest: watch::Sender<Option<SessionView>>,
}

impl<W: Write + Send> TextRenderer<W> {
    /// Renderer writing every frame to `out`, or nothing if `None`.
    pub fn new(out: Option<W>) -> Self {
        let (latest, _) = watch::channel(None);
        Self { out, latest }
    }

    /// Receiver of the most recent view.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionView>> {
        self.latest.subscribe()
    }
}

impl<W: Write + Send> Renderer for TextRenderer<W> {
    type Error = io::Error;

    fn render(&mut self, view: &SessionView) -> Result<(), Self::Error> {
        if let Some(out) = self.out.as_mut() {
            writeln!(out, "--- {} [{}]", view.channel, view.theme)?;
            out.write_all(view.to_text().as_bytes())?;
            out.flush()?;
        }
        self.latest.send_replace(Some(view.clone()));
        Ok(())
    }
}
