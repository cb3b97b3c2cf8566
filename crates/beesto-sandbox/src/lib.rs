//! Sandboxed project runtime.
//!
//! This crate provides:
//! - `SandboxBackend`, the capability boundary of a sandboxed runtime
//! - `Sandbox`, the shared service that boots its backend once on first use
//! - `LocalBackend` for a directory on disk and `MemoryBackend` for tests
//! - the console log fed by spawned processes and the starter project template
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

/// Backend trait and process handles.
mod backend;
/// Console log.
mod console;
/// Sandbox errors.
mod error;
/// Local-directory backend.
mod local;
/// In-memory backend.
mod memory;
/// Shared sandbox service.
mod service;
/// Mountable trees and the starter template.
mod template;

pub use backend::{DirEntry, ProcessHandle, SandboxBackend};
pub use console::{ConsoleEntry, ConsoleFilter, ConsoleLevel, ConsoleLog};
pub use error::{SandboxError, SandboxResult};
pub use local::LocalBackend;
pub use memory::{MemoryBackend, Operation};
pub use service::Sandbox;
pub use template::{MountEntry, MountTree, flatten, starter_template};
