//! Streaming response types shared by providers and the orchestration layer

use crate::error::NewsdeskResult;
use futures::Stream;
use std::pin::Pin;

/// One decoded unit of a streaming response
///
/// A single transport line can carry text, a terminal marker, both (a blocked
/// completion flushes its placeholder together with the final flag), or
/// neither (keep-alives, unparseable lines).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Incremental content, if this chunk carried any
    pub text: Option<String>,
    /// Whether the vendor marked the stream complete at this chunk
    pub is_final: bool,
}

impl StreamEvent {
    /// Content chunk, stream still open
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            is_final: false,
        }
    }

    /// Terminal chunk, optionally carrying trailing content
    pub fn final_event(text: Option<String>) -> Self {
        Self {
            text,
            is_final: true,
        }
    }

    /// Chunk that decoded to nothing useful
    pub fn none() -> Self {
        Self {
            text: None,
            is_final: false,
        }
    }
}

/// Stream of decoded chunks flowing out of a provider
///
/// `Err` items are terminal: a mid-stream transport failure ends the stream,
/// it is never retried from inside.
pub type TextStream = Pin<Box<dyn Stream<Item = NewsdeskResult<StreamEvent>> + Send>>;
