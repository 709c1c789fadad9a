//! Typing-indicator projection.
//!
//! The presence set holds one entry per participant. The tracker folds the
//! "currently typing" query result into a single flag: is anyone other than
//! the local participant typing?

use std::collections::HashMap;

use murmur_proto::{ParticipantId, PresenceEntry};

/// Actions produced by the presence tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceAction {
    /// Write the local participant's typing flag.
    WriteTyping {
        /// Local participant.
        participant: ParticipantId,
        /// New flag.
        is_typing: bool,
    },

    /// Ask the presence store to remove our entry when the connection drops.
    RegisterDisconnectCleanup {
        /// Local participant.
        participant: ParticipantId,
    },

    /// Remove our entry now. Best effort: failure is logged only.
    ClearPresence {
        /// Local participant.
        participant: ParticipantId,
    },

    /// Typing indicator changed, redraw.
    Render,
}

/// Presence fold for one channel.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    local: ParticipantId,
    /// Latest snapshot, by participant.
    entries: HashMap<ParticipantId, bool>,
    others_typing: bool,
}

impl PresenceTracker {
    /// Tracker for the given local participant.
    pub fn new(local: ParticipantId) -> Self {
        Self { local, entries: HashMap::new(), others_typing: false }
    }

    /// Local participant.
    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    /// Session opened: arrange for our entry to vanish if we drop off.
    pub fn on_session_start(&self) -> Vec<PresenceAction> {
        vec![PresenceAction::RegisterDisconnectCleanup { participant: self.local.clone() }]
    }

    /// Local typing state changed. Every call produces a write; the store is
    /// last-write-wins.
    pub fn set_local_typing(&self, is_typing: bool) -> Vec<PresenceAction> {
        vec![PresenceAction::WriteTyping { participant: self.local.clone(), is_typing }]
    }

    /// Fold a snapshot of the typing query.
    ///
    /// Entries with `is_typing == false` are tolerated and ignored. The local
    /// participant never counts, so a snapshot holding only ourselves yields
    /// `false`.
    pub fn on_presence_snapshot(
        &mut self,
        snapshot: impl IntoIterator<Item = PresenceEntry>,
    ) -> Vec<PresenceAction> {
        let typing_before: Vec<ParticipantId> =
            self.typing_participants().into_iter().cloned().collect();
        self.entries = snapshot.into_iter().map(|e| (e.participant_id, e.is_typing)).collect();

        let others_typing =
            self.entries.iter().any(|(participant, &typing)| typing && *participant != self.local);
        let typists_changed = self.typing_participants().into_iter().ne(typing_before.iter());

        if others_typing == self.others_typing && !typists_changed {
            return vec![];
        }
        tracing::debug!(others_typing, "typing indicator changed");
        self.others_typing = others_typing;
        vec![PresenceAction::Render]
    }

    /// Composer text changed: typing while the composer is non-empty.
    pub fn on_composer_changed(&self, text: &str) -> Vec<PresenceAction> {
        self.set_local_typing(!text.is_empty())
    }

    /// A message was sent from the composer, which is now empty.
    pub fn on_message_sent(&self) -> Vec<PresenceAction> {
        self.set_local_typing(false)
    }

    /// Session closing: remove our entry.
    pub fn on_session_end(&mut self) -> Vec<PresenceAction> {
        self.entries.clear();
        self.others_typing = false;
        vec![PresenceAction::ClearPresence { participant: self.local.clone() }]
    }

    /// Whether anyone other than the local participant is typing.
    pub fn others_typing(&self) -> bool {
        self.others_typing
    }

    /// Other participants currently typing, sorted.
    pub fn typing_participants(&self) -> Vec<&ParticipantId> {
        let mut typing: Vec<_> = self
            .entries
            .iter()
            .filter(|(participant, typing)| **typing && **participant != self.local)
            .map(|(participant, _)| participant)
            .collect();
        typing.sort();
        typing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(local: &str) -> PresenceTracker {
        PresenceTracker::new(ParticipantId::new(local))
    }

    #[test]
    fn only_self_typing_is_not_others_typing() {
        let mut presence = tracker("A");
        let actions = presence.on_presence_snapshot([PresenceEntry::typing("A")]);

        assert!(actions.is_empty());
        assert!(!presence.others_typing());
    }

    #[test]
    fn another_participant_typing_sets_flag() {
        let mut presence = tracker("A");
        let actions =
            presence.on_presence_snapshot([PresenceEntry::typing("A"), PresenceEntry::typing("B")]);

        assert_eq!(actions, vec![PresenceAction::Render]);
        assert!(presence.others_typing());
        assert_eq!(presence.typing_participants(), vec![&ParticipantId::new("B")]);
    }

    #[test]
    fn non_typing_entries_are_ignored() {
        let mut presence = tracker("A");
        let _ = presence.on_presence_snapshot([PresenceEntry {
            participant_id: "B".into(),
            is_typing: false,
        }]);
        assert!(!presence.others_typing());
    }

    #[test]
    fn empty_snapshot_clears_flag() {
        let mut presence = tracker("A");
        let _ = presence.on_presence_snapshot([PresenceEntry::typing("B")]);
        let actions = presence.on_presence_snapshot([]);

        assert_eq!(actions, vec![PresenceAction::Render]);
        assert!(!presence.others_typing());
    }

    #[test]
    fn different_typists_redraw_even_if_flag_holds() {
        let mut presence = tracker("A");
        let _ = presence.on_presence_snapshot([PresenceEntry::typing("B")]);

        let actions =
            presence.on_presence_snapshot([PresenceEntry::typing("B"), PresenceEntry::typing("C")]);
        assert_eq!(actions, vec![PresenceAction::Render]);

        let actions = presence.on_presence_snapshot([PresenceEntry::typing("C")]);
        assert_eq!(actions, vec![PresenceAction::Render]);
        assert!(presence.others_typing());
        assert_eq!(presence.typing_participants(), vec![&ParticipantId::new("C")]);
    }

    #[test]
    fn same_typists_do_not_redraw() {
        let mut presence = tracker("A");
        let _ = presence.on_presence_snapshot([PresenceEntry::typing("B")]);
        let actions =
            presence.on_presence_snapshot([PresenceEntry::typing("B"), PresenceEntry::typing("A")]);

        assert!(actions.is_empty());
    }

    #[test]
    fn composer_text_drives_local_typing() {
        let presence = tracker("A");
        let write = |is_typing| {
            vec![PresenceAction::WriteTyping { participant: "A".into(), is_typing }]
        };

        assert_eq!(presence.on_composer_changed("h"), write(true));
        assert_eq!(presence.on_composer_changed(""), write(false));
        assert_eq!(presence.on_message_sent(), write(false));
    }

    #[test]
    fn every_local_typing_call_writes() {
        let presence = tracker("A");
        let first = presence.set_local_typing(true);
        let second = presence.set_local_typing(true);

        assert_eq!(first, second);
        assert_eq!(first, vec![PresenceAction::WriteTyping {
            participant: "A".into(),
            is_typing: true
        }]);
    }

    #[test]
    fn session_lifecycle_registers_then_clears() {
        let mut presence = tracker("A");
        assert!(matches!(presence.on_session_start().as_slice(), [
            PresenceAction::RegisterDisconnectCleanup { .. }
        ]));
        assert!(matches!(presence.on_session_end().as_slice(), [
            PresenceAction::ClearPresence { .. }
        ]));
    }
}
