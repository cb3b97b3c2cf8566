//! Scripted phase endpoint for testing agent runs.
//!
//! Replies are raw `data:` stream bodies keyed by phase and, for execution, by step
//! id. Bodies are cut into small chunks before decoding so records and multi-byte
//! characters straddle chunk boundaries the way they do on the wire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use beesto_core::{
    Error, EventStream, IgnoreLock as _, Phase, PhaseEndpoint, PhaseRequest, Result,
    decode_stream,
};

/// Chunk size used when replaying scripted bodies.
const DEFAULT_CHUNK_SIZE: usize = 7;

/// How the scripted endpoint answers one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A `data:` stream body, replayed in chunks
    Body(String),
    /// A non-success HTTP status with its reason phrase
    Status(u16, String),
    /// A stream that never produces data; ends only on cancellation
    Pending,
}

impl Reply {
    /// A stream of `{content}` records followed by `[DONE]`.
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut body = content_lines(fragments);
        body.push_str(&data_line("[DONE]"));
        Self::Body(body)
    }

    /// `{content}` records, then a `{done, fullContent}` record replacing them.
    pub fn fragments_then_done<I, S>(fragments: I, full_content: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut body = content_lines(fragments);
        body.push_str(&data_line(
            &json!({ "done": true, "fullContent": full_content }).to_string(),
        ));
        body.push_str(&data_line("[DONE]"));
        Self::Body(body)
    }

    /// A single `{content}` record followed by `[DONE]`.
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::fragments([text])
    }

    /// A stream carrying an `{error}` record.
    pub fn stream_error(message: &str) -> Self {
        Self::Body(data_line(&json!({ "error": message }).to_string()))
    }

    /// A failed request with the standard reason phrase for `status`.
    pub fn status(status: u16) -> Self {
        let reason = match status {
            400 => "Bad Request",
            404 => "Not Found",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "Error",
        };
        Self::Status(status, reason.to_owned())
    }
}

fn content_lines<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fragments
        .into_iter()
        .map(|fragment| data_line(&json!({ "content": fragment.as_ref() }).to_string()))
        .collect()
}

/// Formats one `data:` record.
pub fn data_line(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// Scripted replies keyed by phase or step id.
#[derive(Debug, Default)]
struct Script {
    /// Replies for whole phases
    phases: HashMap<Phase, Reply>,
    /// Replies for execution of particular steps
    steps: HashMap<String, Reply>,
}

/// Endpoint that replays scripted stream bodies.
#[derive(Clone, Debug)]
pub struct ScriptedEndpoint {
    /// Scripted replies
    script: Arc<Mutex<Script>>,
    /// Requests received, in order
    call_history: Arc<Mutex<Vec<PhaseRequest>>>,
    /// Bytes per replayed chunk
    chunk_size: usize,
}

impl Default for ScriptedEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEndpoint {
    /// Creates an endpoint with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            call_history: Arc::new(Mutex::new(Vec::new())),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Scripts the reply for a phase.
    #[must_use]
    pub fn with_phase(self, phase: Phase, reply: Reply) -> Self {
        self.script.lock_ignore_poison().phases.insert(phase, reply);
        self
    }

    /// Scripts the execution reply for one step, overriding the execute phase reply.
    #[must_use]
    pub fn with_step(self, step_id: impl Into<String>, reply: Reply) -> Self {
        self.script.lock_ignore_poison().steps.insert(step_id.into(), reply);
        self
    }

    /// Sets the replay chunk size; zero is treated as one.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Requests received so far.
    #[must_use]
    pub fn call_history(&self) -> Vec<PhaseRequest> {
        self.call_history.lock_ignore_poison().clone()
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock_ignore_poison().len()
    }

    /// Phases requested, in order.
    #[must_use]
    pub fn phases_called(&self) -> Vec<Phase> {
        self.call_history
            .lock_ignore_poison()
            .iter()
            .map(|request| request.phase)
            .collect()
    }

    /// Finds the reply for a request.
    fn reply_for(&self, request: &PhaseRequest) -> Option<Reply> {
        let script = self.script.lock_ignore_poison();
        let step_reply = request
            .step
            .as_ref()
            .filter(|_| request.phase == Phase::Execute)
            .and_then(|step| script.steps.get(&step.id));
        step_reply
            .or_else(|| script.phases.get(&request.phase))
            .cloned()
    }
}

#[async_trait]
impl PhaseEndpoint for ScriptedEndpoint {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn request(
        &self,
        request: &PhaseRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        self.call_history.lock_ignore_poison().push(request.clone());
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match self.reply_for(request) {
            Some(Reply::Body(body)) => {
                let chunks: Vec<Result<Vec<u8>>> = body
                    .into_bytes()
                    .chunks(self.chunk_size)
                    .map(|chunk| Ok(chunk.to_vec()))
                    .collect();
                Ok(decode_stream(stream::iter(chunks), cancel))
            }
            Some(Reply::Status(status, reason)) => Err(Error::Endpoint {
                phase: request.phase,
                status,
                reason,
            }),
            Some(Reply::Pending) => Ok(decode_stream(
                stream::pending::<Result<Vec<u8>>>(),
                cancel,
            )),
            None => Err(Error::Endpoint {
                phase: request.phase,
                status: 404,
                reason: "Not Found".to_owned(),
            }),
        }
    }
}
