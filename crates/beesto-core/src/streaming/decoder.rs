use core::mem;
use core::result::Result as CoreResult;
use core::str;

use async_stream::stream;
use futures::{Stream, StreamExt as _};
use serde_json::Value;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{EventStream, StreamEvent};
use crate::Error;

/// Record prefix for event-stream data lines.
const DATA_PREFIX: &str = "data:";
/// Payload marking the end of the stream.
const DONE_MARKER: &str = "[DONE]";

/// Output of the line-level decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A well-formed record
    Event(StreamEvent),
    /// The `[DONE]` marker; nothing after it is decoded
    End,
}

/// Incremental decoder for `data:` framed records.
///
/// Bytes of a UTF-8 sequence split across chunks are held until the rest arrives.
/// A line cut by a chunk boundary is completed by the next chunk.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending_bytes: Vec<u8>,
    /// Text after the last newline
    partial_line: String,
    /// Set once `[DONE]` was seen
    finished: bool,
}

impl SseDecoder {
    /// Creates a decoder with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the end marker has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feeds one chunk and returns the frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }
        self.pending_bytes.extend_from_slice(chunk);
        let text = self.take_valid_text();
        self.partial_line.push_str(&text);

        let mut frames = Vec::new();
        while let Some(newline) = self.partial_line.find('\n') {
            let line: String = self.partial_line.drain(..=newline).collect();
            if let Some(frame) = self.decode_line(&line) {
                frames.push(frame);
                if self.finished {
                    break;
                }
            }
        }
        if self.finished {
            self.partial_line.clear();
            self.pending_bytes.clear();
        }
        frames
    }

    /// Flushes a final unterminated line once the byte stream ends.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.partial_line.push_str(&tail);
            self.pending_bytes.clear();
        }
        let line = mem::take(&mut self.partial_line);
        self.decode_line(&line).into_iter().collect()
    }

    /// Moves the longest valid UTF-8 prefix out of `pending_bytes`.
    ///
    /// Invalid sequences become U+FFFD; an incomplete sequence at the end stays
    /// pending.
    fn take_valid_text(&mut self) -> String {
        let mut text = String::new();
        loop {
            match str::from_utf8(&self.pending_bytes) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending_bytes.clear();
                    return text;
                }
                Err(error) => {
                    let valid_len = error.valid_up_to();
                    let valid = str::from_utf8(&self.pending_bytes[..valid_len]).unwrap_or_default();
                    text.push_str(valid);
                    if let Some(invalid_len) = error.error_len() {
                        text.push(char::REPLACEMENT_CHARACTER);
                        self.pending_bytes.drain(..valid_len + invalid_len);
                    } else {
                        self.pending_bytes.drain(..valid_len);
                        return text;
                    }
                }
            }
        }
    }

    /// Decodes one line, returning `None` for blank, foreign or malformed lines.
    fn decode_line(&mut self, line: &str) -> Option<Frame> {
        let payload = line
            .trim_end_matches(['\n', '\r'])
            .strip_prefix(DATA_PREFIX)?
            .trim();
        if payload == DONE_MARKER {
            self.finished = true;
            return Some(Frame::End);
        }
        match parse_record(payload) {
            Some(event) => Some(Frame::Event(event)),
            None => {
                debug!("Skipping malformed stream record: {payload}");
                None
            }
        }
    }
}

/// Classifies a JSON record into one of the three known shapes.
fn parse_record(payload: &str) -> Option<StreamEvent> {
    let value: Value = serde_json::from_str(payload).ok()?;
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Some(StreamEvent::Error(message.to_owned()));
    }
    if value.get("done").and_then(Value::as_bool) == Some(true) {
        return value
            .get("fullContent")
            .and_then(Value::as_str)
            .filter(|full| !full.is_empty())
            .map(|full| StreamEvent::Done {
                full_content: full.to_owned(),
            });
    }
    value
        .get("content")
        .and_then(Value::as_str)
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| StreamEvent::Content(fragment.to_owned()))
}

/// Turns a byte-chunk stream into a lazy stream of decoded events.
///
/// The stream ends at `[DONE]` or when the input ends. An `{error}` record, a
/// transport error or cancellation yields one `Err` and ends the stream.
pub fn decode_stream<S, B, E>(chunks: S, cancel: CancellationToken) -> EventStream
where
    S: Stream<Item = CoreResult<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<Error> + Send,
{
    Box::pin(stream! {
        let mut decoder = SseDecoder::new();
        let mut chunks = Box::pin(chunks);
        'chunks: loop {
            let next = select! {
                biased;
                () = cancel.cancelled() => None,
                next = chunks.next() => Some(next),
            };
            let Some(next) = next else {
                yield Err(Error::Cancelled);
                break;
            };
            let mut exhausted = false;
            let frames = match next {
                Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                Some(Err(error)) => {
                    yield Err(error.into());
                    break;
                }
                None => {
                    exhausted = true;
                    decoder.finish()
                }
            };
            for frame in frames {
                match frame {
                    Frame::Event(StreamEvent::Error(message)) => {
                        yield Err(Error::Stream(message));
                        break 'chunks;
                    }
                    Frame::Event(event) => yield Ok(event),
                    Frame::End => break 'chunks,
                }
            }
            if exhausted {
                break;
            }
        }
    })
}
