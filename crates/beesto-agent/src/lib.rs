//! Agent loop for the Beesto coding assistant.
//!
//! This crate provides:
//!
//! - [`AgentStore`]: observable run state (lifecycle, plan, logs, report)
//! - [`AgentOrchestrator`]: the analyze, plan, execute, report loop with rollback
//! - [`WorkspaceApplier`]: applies step file changes through the sandbox and stores
//! - [`parse_changes`]: reads file changes out of an execute-phase response
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

/// Applying file changes to the workspace.
mod applier;
/// Step file-change protocol.
mod changes;
/// Phase loop.
mod orchestrator;
/// Agent run state.
mod store;

pub use applier::WorkspaceApplier;
pub use changes::{ParsedChanges, parse_changes};
pub use orchestrator::AgentOrchestrator;
pub use store::{AgentSnapshot, AgentStore};
