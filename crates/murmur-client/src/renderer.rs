//! Rendering surface abstraction.

use crate::SessionView;

/// Consumer of session projections.
///
/// Called after every fold step that changed what is on screen. Widgets,
/// theming and layout live behind this trait and are not part of the
/// session.
pub trait Renderer: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Draw the current view.
    ///
    /// # Errors
    ///
    /// Returns an error if drawing fails. The session ends with
    /// [`crate::SessionError::Render`].
    fn render(&mut self, view: &SessionView) -> Result<(), Self::Error>;
}
