//! Core types and traits for the Beesto coding assistant.
//!
//! This crate provides the agent data model, error handling, configuration, the
//! phase event-stream decoder and the trait implemented by phase endpoints.

/// Agent run states, phases, steps and requests.
pub mod agent;
/// Chat transcript.
pub mod chat;
/// Configuration file handling.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Agent event channel.
pub mod events;
/// Best-effort JSON extraction from model output.
pub mod extract;
/// Project tree nodes and file changes.
pub mod files;
/// Phase event-stream decoding.
pub mod streaming;
/// Mutex helpers.
pub mod sync;
/// Trait definitions for phase endpoints.
pub mod traits;

pub use agent::{AgentState, AgentStep, Phase, PhaseRequest, Plan, RequestContext, StepStatus};
pub use chat::{ChatMessage, ChatTranscript, Role};
pub use config::AgentConfig;
pub use error::{Error, Result};
pub use events::{AgentChannel, AgentEvent};
pub use files::{ChangeOperation, FileChange, FileNode, NodeKind};
pub use streaming::{EventStream, PhaseContent, StreamEvent, collect_phase, decode_stream};
pub use sync::IgnoreLock;
pub use traits::PhaseEndpoint;
