//! Per-event media state machine.
//!
//! A photo entry moves `Pending -> Fetching -> Resolved`. Failed fetches
//! re-enter `Fetching` with a higher attempt number until the retry budget in
//! [`MediaPolicy`] is spent, after which the entry stays in `Fetching`.

use std::time::Duration;

use bytes::Bytes;

/// Media bytes fetched from the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMediaObject {
    /// Location the object was fetched from.
    pub url: String,
    /// MIME type reported by the blob store.
    pub content_type: String,
    /// Object contents.
    pub bytes: Bytes,
}

impl RemoteMediaObject {
    /// Decode path the renderer must use for this object.
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_content_type(&self.content_type)
    }
}

/// How a renderer must decode a media object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Animated decode (GIF).
    Animated,
    /// Static image decode.
    Static,
}

impl MediaKind {
    /// `image/gif` selects the animated path; every other type is static.
    /// Parameters such as `; charset=` are ignored.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("image/gif") { Self::Animated } else { Self::Static }
    }
}

/// State of one photo entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaState {
    /// Placeholder appended, upload not finished.
    Pending,
    /// URL known, bytes requested.
    Fetching {
        /// Object being fetched.
        url: String,
        /// 1-based fetch attempt.
        attempt: u32,
    },
    /// Bytes and content type known.
    Resolved(RemoteMediaObject),
}

impl MediaState {
    /// Short label for logs and text rendering.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching { .. } => "fetching",
            Self::Resolved(_) => "resolved",
        }
    }

    /// Resolved object, if any.
    pub fn object(&self) -> Option<&RemoteMediaObject> {
        match self {
            Self::Resolved(object) => Some(object),
            Self::Pending | Self::Fetching { .. } => None,
        }
    }
}

/// Retry budget for media fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPolicy {
    /// Total attempts per entry, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before each retry.
    pub retry_backoff: Duration,
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, retry_backoff: Duration::from_millis(500) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gif_selects_animated_decode() {
        assert_eq!(MediaKind::from_content_type("image/gif"), MediaKind::Animated);
        assert_eq!(MediaKind::from_content_type("IMAGE/GIF; foo=bar"), MediaKind::Animated);
    }

    #[test]
    fn other_types_decode_static() {
        assert_eq!(MediaKind::from_content_type("image/jpeg"), MediaKind::Static);
        assert_eq!(MediaKind::from_content_type("image/png"), MediaKind::Static);
        assert_eq!(MediaKind::from_content_type(""), MediaKind::Static);
    }
}
