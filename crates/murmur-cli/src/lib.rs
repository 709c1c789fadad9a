//! Scripted channel replay.
//!
//! A script seeds an in-process `MemoryBackend` and then plays remote
//! participants step by step while a `ChannelSession` follows the channel.
//! The binary prints the resulting transcript as text.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod replay;
mod script;
mod text_renderer;

pub use error::ReplayError;
pub use replay::{ReplayOptions, replay};
pub use script::{Blob, Script, Step};
pub use text_renderer::TextRenderer;
