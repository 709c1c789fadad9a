//! Replay script format.
//!
//! ```json
//! {
//!   "config": { "bubble_theme": "dark" },
//!   "blobs": [{ "url": "gs://bucket/img.jpg", "content_type": "image/jpeg", "data": "..." }],
//!   "steps": [
//!     { "append": { "senderId": "u1", "senderName": "Ann", "text": "hi" } },
//!     { "append": { "senderId": "u1", "senderName": "Ann", "photoURL": "NOTSET" } },
//!     { "update": { "key": 1, "photoURL": "gs://bucket/img.jpg" } },
//!     { "typing": { "participant": "u3", "is_typing": true } },
//!     { "send": "hello" }
//!   ]
//! }
//! ```

use std::{collections::HashMap, path::Path};

use bytes::Bytes;
use murmur_proto::EventRecord;
use serde::Deserialize;

use crate::error::ReplayError;

/// Channel contents and remote activity to replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Script {
    /// Remote config served to the session. Empty means unavailable.
    #[serde(default)]
    pub config: HashMap<String, String>,

    /// Objects available in the blob store.
    #[serde(default)]
    pub blobs: Vec<Blob>,

    /// Steps applied in order once the session is running.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One blob store object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Blob {
    /// URL the object is fetched from.
    pub url: String,
    /// MIME type reported on fetch.
    pub content_type: String,
    /// Object contents, taken as UTF-8 bytes.
    #[serde(default)]
    pub data: String,
}

impl Blob {
    /// Object contents.
    pub fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.data.as_bytes())
    }
}

/// A scripted action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// A remote participant appends a record.
    Append(EventRecord),

    /// A remote participant resolves a photo placeholder.
    Update {
        /// Log position of the placeholder.
        key: u64,
        /// Uploaded image URL.
        #[serde(rename = "photoURL")]
        photo_url: String,
    },

    /// A remote participant's typing flag changes.
    Typing {
        /// Participant id.
        participant: String,
        /// New flag.
        is_typing: bool,
    },

    /// A remote participant drops off without leaving.
    Disconnect {
        /// Participant id.
        participant: String,
    },

    /// The local participant sends a text message.
    Send(String),

    /// The local participant's typing flag changes.
    SetTyping(bool),

    /// The local participant's composer text changes.
    Compose(String),

    /// Pause before the next step.
    Wait {
        /// Milliseconds to wait.
        ms: u64,
    },
}

impl Script {
    /// Parse a script from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Parse`] if the text is not a valid script.
    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a script file.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Io`] if the file cannot be read, or
    /// [`ReplayError::Parse`] if it is not a valid script.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_step_kind() {
        let script = Script::from_json(
            r#"{
                "steps": [
                    { "append": { "senderId": "u1", "senderName": "Ann", "text": "hi" } },
                    { "update": { "key": 1, "photoURL": "gs://bucket/img.jpg" } },
                    { "typing": { "participant": "u3", "is_typing": true } },
                    { "disconnect": { "participant": "u3" } },
                    { "send": "hello" },
                    { "set_typing": false },
                    { "compose": "hel" },
                    { "wait": { "ms": 250 } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(script.steps, vec![
            Step::Append(EventRecord::text("u1", "Ann", "hi")),
            Step::Update { key: 1, photo_url: "gs://bucket/img.jpg".into() },
            Step::Typing { participant: "u3".into(), is_typing: true },
            Step::Disconnect { participant: "u3".into() },
            Step::Send("hello".into()),
            Step::SetTyping(false),
            Step::Compose("hel".into()),
            Step::Wait { ms: 250 },
        ]);
        assert!(script.config.is_empty());
    }

    #[test]
    fn unknown_step_is_a_parse_error() {
        let result = Script::from_json(r#"{ "steps": [{ "explode": true }] }"#);
        assert!(matches!(result, Err(ReplayError::Parse(_))));
    }
}
