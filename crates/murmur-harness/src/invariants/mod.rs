//! Invariant checking for session simulation.
//!
//! Invariants are properties that must hold for every frame a session
//! renders. Unlike example-based tests that check specific scenarios, they
//! verify behavioral properties across all execution paths.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! for frame in renderer.frames() {
//!     registry.assert_all(&frame, "after scenario");
//! }
//! ```

mod checks;

pub use checks::{FailedSendsAreFailed, LogOrder, PendingMediaConsistency, SelfNeverTyping, UniqueKeys};
use murmur_client::SessionView;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against a rendered view.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against one view.
    fn check(&self, view: &SessionView) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the standard session invariants.
    ///
    /// Includes:
    /// - [`LogOrder`]: entries appear in log order
    /// - [`UniqueKeys`]: one entry per event key
    /// - [`PendingMediaConsistency`]: pending count matches unresolved photos
    /// - [`SelfNeverTyping`]: the local participant never shows as typing
    /// - [`FailedSendsAreFailed`]: only failed sends are listed as failed
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(LogOrder);
        registry.add(UniqueKeys);
        registry.add(PendingMediaConsistency);
        registry.add(SelfNeverTyping);
        registry.add(FailedSendsAreFailed);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given view.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, view: &SessionView) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(view).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    ///
    /// # Panics
    ///
    /// Panics if any invariant is violated.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, view: &SessionView, context: &str) {
        if let Err(violations) = self.check_all(view) {
            let messages: Vec<_> = violations.iter().map(|v| v.to_string()).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use murmur_core::Theme;
    use murmur_proto::{ChannelId, ParticipantId};

    use super::*;

    fn empty_view() -> SessionView {
        SessionView {
            channel: ChannelId::new("general"),
            local_participant: ParticipantId::new("u1"),
            transcript: vec![],
            others_typing: false,
            typing: vec![],
            theme: Theme::Classic,
            pending_media: 0,
            sending: 0,
            failed_sends: vec![],
            diagnostics: vec![],
        }
    }

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn empty_view_passes_invariants() {
        assert!(InvariantRegistry::standard().check_all(&empty_view()).is_ok());
    }

    #[test]
    fn self_typing_is_a_violation() {
        let mut view = empty_view();
        view.others_typing = true;
        view.typing = vec![ParticipantId::new("u1")];

        let violations = InvariantRegistry::standard().check_all(&view).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "self_never_typing");
    }
}
