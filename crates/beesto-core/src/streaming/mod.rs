//! Decoding of the phase endpoint's `data:` event stream.
//!
//! The endpoint frames every record as `data: <json>` followed by a blank line and
//! finishes with `data: [DONE]`. Each JSON payload is one of three shapes:
//! `{content}` fragments, a terminal `{done: true, fullContent}` that replaces all
//! fragments, or `{error}`.

use core::pin::Pin;

use futures::{Stream, StreamExt as _};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Incremental `data:` record decoder
pub mod decoder;

pub use decoder::{Frame, SseDecoder, decode_stream};

/// Boxed stream of decoded phase events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// One decoded record from a phase stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental text to append
    Content(String),
    /// Authoritative replacement for everything streamed so far
    Done {
        /// Complete phase output
        full_content: String,
    },
    /// The phase failed upstream
    Error(String),
}

/// Accumulates the output of one phase.
///
/// Fragments concatenate in arrival order; a `Done` event replaces the buffer
/// outright rather than merging with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseContent {
    /// Text accumulated so far
    text: String,
    /// Whether a `Done` event supplied the text
    authoritative: bool,
}

impl PhaseContent {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event, returning the fragment to forward live, if any.
    pub fn apply<'event>(&mut self, event: &'event StreamEvent) -> Option<&'event str> {
        match event {
            StreamEvent::Content(fragment) => {
                self.text.push_str(fragment);
                Some(fragment.as_str())
            }
            StreamEvent::Done { full_content } => {
                self.text.clone_from(full_content);
                self.authoritative = true;
                None
            }
            StreamEvent::Error(_) => None,
        }
    }

    /// Whether the final text came from a `Done` event.
    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    /// Current accumulated text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consumes the accumulator, returning the text.
    pub fn into_string(self) -> String {
        self.text
    }
}

/// Drains a phase stream, forwarding each fragment to `on_fragment` as it arrives.
///
/// # Errors
/// Returns the first error the stream yields; fragments already forwarded stay
/// forwarded.
pub async fn collect_phase(
    mut events: EventStream,
    mut on_fragment: impl FnMut(&str) + Send,
) -> Result<String> {
    let mut content = PhaseContent::new();
    while let Some(event) = events.next().await {
        let event = event?;
        if let StreamEvent::Error(message) = event {
            return Err(Error::Stream(message));
        }
        if let Some(fragment) = content.apply(&event) {
            on_fragment(fragment);
        }
    }
    Ok(content.into_string())
}
