//! Chat transcript shared between the UI and the agent.
//!
//! The transcript is append-only from the agent's side: streamed model output is
//! appended to the last assistant message instead of creating one message per chunk.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;
use crate::sync::IgnoreLock as _;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the assistant
    User,
    /// The model
    Assistant,
    /// Out-of-band notices
    System,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message id
    pub id: String,
    /// Author
    pub role: Role,
    /// Text content
    pub content: String,
    /// Whether content is still arriving
    #[serde(default)]
    pub is_streaming: bool,
}

impl ChatMessage {
    /// Creates a message with a fresh id.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            role,
            content: content.into(),
            is_streaming: false,
        }
    }
}

/// Thread-safe, append-only message list.
#[derive(Debug, Default)]
pub struct ChatTranscript {
    /// Messages in arrival order
    messages: Mutex<Vec<ChatMessage>>,
}

impl ChatTranscript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns its id.
    pub fn add_message(&self, role: Role, content: impl Into<String>) -> String {
        let message = ChatMessage::new(role, content);
        let id = message.id.clone();
        self.messages.lock_ignore_poison().push(message);
        id
    }

    /// Appends text to the last message if it was written by the assistant.
    ///
    /// Returns `false` (and changes nothing) when the transcript is empty or the last
    /// message belongs to another role.
    pub fn append_to_last_message(&self, fragment: &str) -> bool {
        let mut messages = self.messages.lock_ignore_poison();
        match messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.push_str(fragment);
                true
            }
            _ => false,
        }
    }

    /// Marks the last assistant message as streaming or finished.
    ///
    /// Any other message still flagged as streaming is cleared first, so at most one
    /// message streams at a time.
    pub fn set_last_message_streaming(&self, streaming: bool) -> bool {
        let mut messages = self.messages.lock_ignore_poison();
        let Some(last_index) = messages.len().checked_sub(1) else {
            return false;
        };
        if messages[last_index].role != Role::Assistant {
            return false;
        }
        for message in messages.iter_mut() {
            message.is_streaming = false;
        }
        messages[last_index].is_streaming = streaming;
        true
    }

    /// Whether any message is currently streaming.
    pub fn is_streaming(&self) -> bool {
        self.messages
            .lock_ignore_poison()
            .iter()
            .any(|message| message.is_streaming)
    }

    /// Snapshot of every message.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock_ignore_poison().clone()
    }

    /// The last `count` messages, oldest first.
    pub fn recent(&self, count: usize) -> Vec<ChatMessage> {
        let messages = self.messages.lock_ignore_poison();
        let start = messages.len().saturating_sub(count);
        messages[start..].to_vec()
    }

    /// Removes every message.
    pub fn clear(&self) {
        self.messages.lock_ignore_poison().clear();
    }

    /// Serializes the conversation as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> Result<String> {
        let messages = self.messages();
        Ok(serde_json::to_string_pretty(&messages)?)
    }
}
