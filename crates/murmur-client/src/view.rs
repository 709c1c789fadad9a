//! Render-ready snapshot of a session.

use std::fmt::Write as _;

use murmur_core::{Diagnostic, EntryContent, MediaState, OutboxEntry, Theme, TranscriptEntry};
use murmur_proto::{ChannelId, ParticipantId};

/// Everything a renderer needs to draw one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Channel shown.
    pub channel: ChannelId,
    /// Participant this client speaks for.
    pub local_participant: ParticipantId,
    /// Transcript in arrival order.
    pub transcript: Vec<TranscriptEntry>,
    /// Whether anyone else is typing.
    pub others_typing: bool,
    /// Who else is typing, sorted.
    pub typing: Vec<ParticipantId>,
    /// Bubble theme chosen at session start.
    pub theme: Theme,
    /// Photo entries not yet resolved.
    pub pending_media: usize,
    /// Sends still awaiting acceptance.
    pub sending: usize,
    /// Sends that failed, oldest first.
    pub failed_sends: Vec<OutboxEntry>,
    /// Most recent diagnostics, oldest first.
    pub diagnostics: Vec<Diagnostic>,
}

impl SessionView {
    /// Plain-text rendering, one line per entry. Incoming entries are
    /// labelled with the sender's name, own entries with `>`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.transcript {
            let body = match &entry.content {
                EntryContent::Text(text) => text.clone(),
                EntryContent::Photo(MediaState::Resolved(object)) => format!(
                    "[photo {} {} bytes {:?}]",
                    object.content_type,
                    object.bytes.len(),
                    object.kind()
                ),
                EntryContent::Photo(state) => format!("[photo {}]", state.label()),
            };
            let _ = match entry.sender_label(&self.local_participant) {
                Some(name) => writeln!(out, "{} {name}: {body}", entry.key),
                None => writeln!(out, "{} > {body}", entry.key),
            };
        }

        if self.others_typing {
            let names: Vec<_> = self.typing.iter().map(ParticipantId::as_str).collect();
            let _ = writeln!(out, "... {} typing", names.join(", "));
        }
        for failed in &self.failed_sends {
            let _ = writeln!(out, "! {} failed to send", failed.local_id);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use murmur_proto::EventKey;

    use super::*;

    fn entry(key: u64, sender: &str, name: &str, text: &str) -> TranscriptEntry {
        TranscriptEntry {
            key: EventKey::new(key),
            sender_id: ParticipantId::new(sender),
            display_name: name.into(),
            content: EntryContent::Text(text.into()),
        }
    }

    #[test]
    fn own_messages_are_unlabelled() {
        let view = SessionView {
            channel: ChannelId::new("general"),
            local_participant: ParticipantId::new("u1"),
            transcript: vec![entry(0, "u2", "Bea", "hi Ann"), entry(1, "u1", "Ann", "hi Bea")],
            others_typing: false,
            typing: vec![],
            theme: Theme::Classic,
            pending_media: 0,
            sending: 0,
            failed_sends: vec![],
            diagnostics: vec![],
        };

        assert_eq!(view.to_text(), "#0 Bea: hi Ann\n#1 > hi Bea\n");
    }
}
