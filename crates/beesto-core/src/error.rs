use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

use crate::agent::Phase;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur anywhere in the agent workspace.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The phase endpoint answered with a non-success status.
    #[error("{phase} failed: {status} {reason}")]
    Endpoint {
        /// Phase whose request failed
        phase: Phase,
        /// HTTP status code returned by the endpoint
        status: u16,
        /// Status text or response body excerpt
        reason: String,
    },

    /// The event stream reported an error record.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// The sandbox rejected an operation.
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// The sandbox could not be booted.
    #[error("Sandbox failed to boot: {0}")]
    SandboxBoot(String),

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A path escaped the workspace or was otherwise unusable.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}
