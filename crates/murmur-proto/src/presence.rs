//! Presence set entries.

use serde::{Deserialize, Serialize};

use crate::ids::ParticipantId;

/// One participant's typing flag in a channel's presence set.
///
/// Keyed by participant, last write wins. Entries are removed outright (not
/// set to `false`) when the participant disconnects or clears presence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Participant owning the entry.
    #[serde(rename = "participantId")]
    pub participant_id: ParticipantId,
    /// Whether the participant is currently typing.
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
}

impl PresenceEntry {
    /// Entry for a typing participant.
    pub fn typing(participant_id: impl Into<ParticipantId>) -> Self {
        Self { participant_id: participant_id.into(), is_typing: true }
    }
}
