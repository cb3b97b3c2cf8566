use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::{SandboxError, SandboxResult};
use crate::template::{MountTree, flatten};

/// One entry returned by [`SandboxBackend::read_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name, without its parent path
    pub name: String,
    /// Whether the entry is a directory
    pub is_directory: bool,
}

/// A process running inside the sandbox.
///
/// Output lines arrive on `output` (stdout and stderr interleaved); the exit code
/// arrives once the process ends.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Output lines in arrival order
    output: mpsc::UnboundedReceiver<String>,
    /// Exit code, sent once
    exit: oneshot::Receiver<i32>,
}

impl ProcessHandle {
    /// Creates a handle and the sending halves its producer writes to.
    pub fn channel() -> (mpsc::UnboundedSender<String>, oneshot::Sender<i32>, Self) {
        let (output_tx, output) = mpsc::unbounded_channel();
        let (exit_tx, exit) = oneshot::channel();
        (output_tx, exit_tx, Self { output, exit })
    }

    /// Creates a handle for a process that already ran to completion.
    pub fn finished(lines: impl IntoIterator<Item = String>, exit_code: i32) -> Self {
        let (output_tx, exit_tx, handle) = Self::channel();
        for line in lines {
            drop(output_tx.send(line));
        }
        drop(exit_tx.send(exit_code));
        handle
    }

    /// Next output line, or `None` once the process closed its output.
    pub async fn next_line(&mut self) -> Option<String> {
        self.output.recv().await
    }

    /// Waits for the exit code.
    ///
    /// # Errors
    /// Returns an error if the process supervisor went away without reporting one.
    pub async fn wait(self) -> SandboxResult<i32> {
        self.exit
            .await
            .map_err(|_| SandboxError::Process("process exited without a status".to_owned()))
    }
}

/// The capability boundary of a sandboxed runtime.
///
/// Paths are relative to the sandbox root, without a leading separator; the empty
/// path names the root itself.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Short backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Starts the runtime. Called at most once per successful boot.
    ///
    /// # Errors
    /// Returns [`SandboxError::Boot`] if the runtime cannot start.
    async fn boot(&self) -> SandboxResult<()>;

    /// Reads a UTF-8 file.
    ///
    /// # Errors
    /// Returns an error if the file is missing, a directory or unreadable.
    async fn read_file(&self, path: &str) -> SandboxResult<String>;

    /// Writes a file, replacing existing content.
    ///
    /// # Errors
    /// Returns an error if the parent directory is missing or the write fails.
    async fn write_file(&self, path: &str, content: &str) -> SandboxResult<()>;

    /// Lists a directory's entries.
    ///
    /// # Errors
    /// Returns an error if the path is missing or not a directory.
    async fn read_directory(&self, path: &str) -> SandboxResult<Vec<DirEntry>>;

    /// Whether `path` names a directory; missing paths are not directories.
    async fn is_directory(&self, path: &str) -> bool {
        self.read_directory(path).await.is_ok()
    }

    /// Creates a directory and any missing parents.
    ///
    /// # Errors
    /// Returns an error if a path component is a file.
    async fn mkdir(&self, path: &str) -> SandboxResult<()>;

    /// Moves a file or directory.
    ///
    /// # Errors
    /// Returns an error if the source is missing or the move fails.
    async fn rename(&self, from: &str, to: &str) -> SandboxResult<()>;

    /// Removes a file, or a directory with everything below it.
    ///
    /// # Errors
    /// Returns an error if the path is missing.
    async fn remove(&self, path: &str) -> SandboxResult<()>;

    /// Starts a process in the sandbox root.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started.
    async fn spawn(&self, command: &str, args: &[String]) -> SandboxResult<ProcessHandle>;

    /// Writes a whole tree into the sandbox root.
    ///
    /// # Errors
    /// Returns the first write error encountered.
    async fn mount(&self, tree: &MountTree) -> SandboxResult<()> {
        for (path, contents) in flatten(tree) {
            match contents {
                Some(contents) => self.write_file(&path, &contents).await?,
                None => self.mkdir(&path).await?,
            }
        }
        Ok(())
    }
}
