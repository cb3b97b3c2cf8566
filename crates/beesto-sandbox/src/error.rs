use std::io::Error as IoError;

use beesto_core::Error as CoreError;
use thiserror::Error;

/// Errors raised by sandbox backends and the sandbox service.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// The backend could not be booted.
    #[error("Sandbox failed to boot: {0}")]
    Boot(String),

    /// The path does not exist.
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// A directory operation targeted a file.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A file operation targeted a directory.
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// The path escapes the sandbox root or is otherwise unusable.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A process could not be started or supervised.
    #[error("Process error: {0}")]
    Process(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

impl From<SandboxError> for CoreError {
    fn from(error: SandboxError) -> Self {
        match error {
            SandboxError::Io(source) => Self::Io(source),
            SandboxError::Boot(message) => Self::SandboxBoot(message),
            SandboxError::NotFound(path) => Self::FileNotFound(path),
            SandboxError::InvalidPath(path) => Self::InvalidPath(path),
            other @ (SandboxError::NotADirectory(_)
            | SandboxError::IsADirectory(_)
            | SandboxError::Process(_)) => Self::Sandbox(other.to_string()),
        }
    }
}
