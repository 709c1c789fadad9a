//! Per-session configuration.
//!
//! The bubble theme comes from a remote feature-flag service, but it is
//! resolved once at session start and threaded through as a plain value.

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use murmur_proto::ParticipantId;

use crate::{error::ConfigError, media::MediaPolicy};

/// Remote config key holding the theme name.
pub const THEME_CONFIG_KEY: &str = "bubble_theme";

/// Default replay window on subscribe.
const DEFAULT_SINCE_LIMIT: usize = 50;

/// Default bound on a single media fetch.
const DEFAULT_MEDIA_TIMEOUT: Duration = Duration::from_secs(10);

/// Message bubble theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    /// Light bubbles.
    #[default]
    Classic,
    /// Dark bubbles.
    Dark,
    /// Blue bubbles.
    Ocean,
}

impl Theme {
    /// Name as stored in remote config.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Dark => "dark",
            Self::Ocean => "ocean",
        }
    }

    /// Pick the theme from a remote config fetch. Missing or unknown values
    /// fall back to `fallback`.
    pub fn from_remote(values: &HashMap<String, String>, fallback: Self) -> Self {
        let Some(raw) = values.get(THEME_CONFIG_KEY) else {
            return fallback;
        };

        raw.parse().unwrap_or_else(|error: ConfigError| {
            tracing::warn!(%error, "ignoring remote theme");
            fallback
        })
    }
}

impl FromStr for Theme {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(Self::Classic),
            "dark" => Ok(Self::Dark),
            "ocean" => Ok(Self::Ocean),
            _ => Err(ConfigError::UnknownTheme(raw.to_owned())),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one channel session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Participant this client speaks for.
    pub local_participant: ParticipantId,
    /// Name written into outgoing records.
    pub display_name: String,
    /// Replay only the most recent N events on subscribe. `None` replays the
    /// whole log.
    pub since_limit: Option<usize>,
    /// Bound on one media fetch. Expiry counts as a failure.
    pub media_timeout: Duration,
    /// Retry budget for media fetches.
    pub media: MediaPolicy,
    /// Theme used when remote config is unavailable.
    pub default_theme: Theme,
}

impl SessionConfig {
    /// Defaults for the given participant.
    pub fn new(local_participant: ParticipantId, display_name: impl Into<String>) -> Self {
        Self {
            local_participant,
            display_name: display_name.into(),
            since_limit: Some(DEFAULT_SINCE_LIMIT),
            media_timeout: DEFAULT_MEDIA_TIMEOUT,
            media: MediaPolicy::default(),
            default_theme: Theme::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(value: &str) -> HashMap<String, String> {
        HashMap::from([(THEME_CONFIG_KEY.to_owned(), value.to_owned())])
    }

    #[test]
    fn remote_theme_is_used_when_known() {
        assert_eq!(Theme::from_remote(&remote("Dark"), Theme::Classic), Theme::Dark);
    }

    #[test]
    fn unknown_or_missing_theme_falls_back() {
        assert_eq!(Theme::from_remote(&remote("neon"), Theme::Ocean), Theme::Ocean);
        assert_eq!(Theme::from_remote(&HashMap::new(), Theme::Dark), Theme::Dark);
    }

    #[test]
    fn defaults_bound_the_replay_window() {
        let config = SessionConfig::new("u1".into(), "Ann");
        assert_eq!(config.since_limit, Some(50));
        assert_eq!(config.media.max_attempts, 3);
    }
}
