//! Property tests for the typing indicator fold.

use murmur_core::{PresenceAction, PresenceTracker};
use murmur_proto::{ParticipantId, PresenceEntry};
use proptest::prelude::*;

const LOCAL: &str = "p0";

fn participant(index: u8) -> ParticipantId {
    ParticipantId::new(format!("p{index}"))
}

fn snapshot_strategy() -> impl Strategy<Value = Vec<PresenceEntry>> {
    prop::collection::vec((0u8..4, any::<bool>()), 0..8).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(index, is_typing)| PresenceEntry { participant_id: participant(index), is_typing })
            .collect()
    })
}

proptest! {
    #[test]
    fn indicator_is_set_iff_someone_else_types(
        snapshots in prop::collection::vec(snapshot_strategy(), 1..6)
    ) {
        let mut tracker = PresenceTracker::new(ParticipantId::new(LOCAL));

        for snapshot in snapshots {
            let before = tracker.others_typing();
            let typists_before: Vec<ParticipantId> =
                tracker.typing_participants().into_iter().cloned().collect();
            // Later entries for the same participant win, as in a keyed store.
            let mut latest = std::collections::HashMap::new();
            for entry in &snapshot {
                latest.insert(entry.participant_id.clone(), entry.is_typing);
            }
            let expected = latest
                .iter()
                .any(|(participant, typing)| *typing && participant.as_str() != LOCAL);

            let actions = tracker.on_presence_snapshot(snapshot);

            let typists_after: Vec<ParticipantId> =
                tracker.typing_participants().into_iter().cloned().collect();

            prop_assert_eq!(tracker.others_typing(), expected);
            prop_assert_eq!(
                actions.contains(&PresenceAction::Render),
                before != expected || typists_before != typists_after
            );
            prop_assert!(tracker.typing_participants().iter().all(|p| p.as_str() != LOCAL));
        }
    }

    #[test]
    fn only_local_typing_is_never_shown(count in 1usize..5) {
        let mut tracker = PresenceTracker::new(ParticipantId::new(LOCAL));
        let snapshot = vec![PresenceEntry::typing(LOCAL); count];

        tracker.on_presence_snapshot(snapshot);

        prop_assert!(!tracker.others_typing());
    }
}

#[test]
fn two_typists_with_local_among_them() {
    let mut tracker = PresenceTracker::new(ParticipantId::new("A"));

    tracker.on_presence_snapshot(vec![PresenceEntry::typing("A")]);
    assert!(!tracker.others_typing());

    tracker.on_presence_snapshot(vec![PresenceEntry::typing("A"), PresenceEntry::typing("B")]);
    assert!(tracker.others_typing());
}
