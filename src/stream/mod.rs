//! Frame decoders turning raw response bodies into discrete events.
//!
//! Two wire framings are understood: text event streams ([`sse`]) as sent by the
//! direct API and Vertex, and the binary event-stream framing ([`eventstream`]) used
//! by Bedrock. Both produce the same [`Frame`] so the mapping layer does not care
//! which backend a response came from.

use std::pin::Pin;

use futures_core::Stream;

use crate::error::LLMError;

pub mod eventstream;
pub mod sse;

pub use eventstream::EventStreamDecoder;
pub use sse::SseDecoder;

/// One decoded event of a streaming body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Event type, e.g. `content_block_delta`.
    pub name: Option<String>,
    pub id: Option<String>,
    /// Accumulated payload; every `data` line contributes its value plus `\n`.
    pub data: String,
}

impl Frame {
    /// Event name, or the empty string when the frame did not declare one.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// Lazy, finite sequence of frames.
///
/// An `Err` item is terminal: the decoder yields nothing after it.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, LLMError>> + Send>>;
