//! Standard invariant checks.

use std::collections::HashSet;

use murmur_client::SessionView;
use murmur_core::{MediaState, SendStatus};

use super::{Invariant, InvariantResult, Violation};

/// Entries appear in log order.
///
/// The log assigns increasing keys and delivers appends in key order, so a
/// transcript whose keys go backwards was re-sorted or merged incorrectly.
pub struct LogOrder;

impl Invariant for LogOrder {
    fn name(&self) -> &'static str {
        "log_order"
    }

    fn check(&self, view: &SessionView) -> InvariantResult {
        for window in view.transcript.windows(2) {
            if window[1].key <= window[0].key {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{} follows {}", window[1].key, window[0].key),
                });
            }
        }
        Ok(())
    }
}

/// Each event key yields at most one entry, however often it is delivered.
pub struct UniqueKeys;

impl Invariant for UniqueKeys {
    fn name(&self) -> &'static str {
        "unique_keys"
    }

    fn check(&self, view: &SessionView) -> InvariantResult {
        let mut seen = HashSet::new();
        for entry in &view.transcript {
            if !seen.insert(entry.key) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{} appears more than once", entry.key),
                });
            }
        }
        Ok(())
    }
}

/// The pending media count equals the number of unresolved photo entries.
pub struct PendingMediaConsistency;

impl Invariant for PendingMediaConsistency {
    fn name(&self) -> &'static str {
        "pending_media_consistency"
    }

    fn check(&self, view: &SessionView) -> InvariantResult {
        let unresolved = view
            .transcript
            .iter()
            .filter_map(|entry| entry.content.media())
            .filter(|state| !matches!(state, MediaState::Resolved(_)))
            .count();

        if unresolved != view.pending_media {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "pending_media is {} but {unresolved} photos are unresolved",
                    view.pending_media
                ),
            });
        }
        Ok(())
    }
}

/// The local participant never shows as typing, and the indicator is set
/// exactly when someone else is listed.
pub struct SelfNeverTyping;

impl Invariant for SelfNeverTyping {
    fn name(&self) -> &'static str {
        "self_never_typing"
    }

    fn check(&self, view: &SessionView) -> InvariantResult {
        if view.typing.contains(&view.local_participant) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("local participant {} listed as typing", view.local_participant),
            });
        }
        if view.others_typing == view.typing.is_empty() {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "others_typing is {} with {} typing participants",
                    view.others_typing,
                    view.typing.len()
                ),
            });
        }
        Ok(())
    }
}

/// Every entry listed under `failed_sends` is in the failed state.
pub struct FailedSendsAreFailed;

impl Invariant for FailedSendsAreFailed {
    fn name(&self) -> &'static str {
        "failed_sends_are_failed"
    }

    fn check(&self, view: &SessionView) -> InvariantResult {
        match view.failed_sends.iter().find(|e| !matches!(e.status, SendStatus::Failed { .. })) {
            Some(entry) => Err(Violation {
                invariant: self.name(),
                message: format!("{} listed as failed while {:?}", entry.local_id, entry.status),
            }),
            None => Ok(()),
        }
    }
}
