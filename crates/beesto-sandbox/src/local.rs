//! Sandbox backend rooted in a directory on the local filesystem.

use std::io::{Error as IoError, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncBufReadExt as _, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::backend::{DirEntry, ProcessHandle, SandboxBackend};
use crate::error::{SandboxError, SandboxResult};

/// Backend storing the project in a local directory and running processes there.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Root directory to constrain file access
    root_dir: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root_dir`.
    ///
    /// All paths are resolved relative to this directory.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Root directory of the sandbox.
    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Resolve a path relative to the root directory and validate it's within bounds.
    ///
    /// Works lexically so paths that do not exist yet can be checked.
    ///
    /// # Errors
    /// Returns error if the path is absolute or climbs out of the root
    fn resolve_path(&self, path: &str) -> SandboxResult<PathBuf> {
        let mut resolved = self.root_dir.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::InvalidPath(format!(
                        "Path '{path}' is outside the sandbox root"
                    )));
                }
            }
        }
        Ok(resolved)
    }
}

/// Maps `NotFound` I/O errors to [`SandboxError::NotFound`].
fn io_error(path: &str, error: IoError) -> SandboxError {
    if error.kind() == ErrorKind::NotFound {
        SandboxError::NotFound(path.to_owned())
    } else {
        SandboxError::Io(error)
    }
}

/// Forwards each line of `reader` into `sink` until EOF.
async fn pump_lines<R>(reader: R, sink: UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if sink.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(error) => {
                warn!("Failed to read process output: {error}");
                break;
            }
        }
    }
}

#[async_trait]
impl SandboxBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn boot(&self) -> SandboxResult<()> {
        fs::create_dir_all(&self.root_dir)
            .await
            .map_err(|error| SandboxError::Boot(format!("{}: {error}", self.root_dir.display())))?;
        debug!("Local sandbox rooted at {}", self.root_dir.display());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> SandboxResult<String> {
        let full_path = self.resolve_path(path)?;
        if fs::metadata(&full_path)
            .await
            .map_err(|error| io_error(path, error))?
            .is_dir()
        {
            return Err(SandboxError::IsADirectory(path.to_owned()));
        }
        fs::read_to_string(&full_path)
            .await
            .map_err(|error| io_error(path, error))
    }

    async fn write_file(&self, path: &str, content: &str) -> SandboxResult<()> {
        let full_path = self.resolve_path(path)?;
        fs::write(&full_path, content)
            .await
            .map_err(|error| io_error(path, error))
    }

    async fn read_directory(&self, path: &str) -> SandboxResult<Vec<DirEntry>> {
        let full_path = self.resolve_path(path)?;
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|error| io_error(path, error))?;
        if !metadata.is_dir() {
            return Err(SandboxError::NotADirectory(path.to_owned()));
        }

        let mut reader = fs::read_dir(&full_path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: entry.file_type().await?.is_dir(),
            });
        }
        entries.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &str) -> SandboxResult<()> {
        let full_path = self.resolve_path(path)?;
        fs::create_dir_all(&full_path).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> SandboxResult<()> {
        let source = self.resolve_path(from)?;
        let target = self.resolve_path(to)?;
        fs::rename(&source, &target)
            .await
            .map_err(|error| io_error(from, error))
    }

    async fn remove(&self, path: &str) -> SandboxResult<()> {
        let full_path = self.resolve_path(path)?;
        if full_path == self.root_dir {
            return Err(SandboxError::InvalidPath(
                "Refusing to remove the sandbox root".to_owned(),
            ));
        }
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|error| io_error(path, error))?;
        if metadata.is_dir() {
            fs::remove_dir_all(&full_path).await?;
        } else {
            fs::remove_file(&full_path).await?;
        }
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> SandboxResult<ProcessHandle> {
        debug!("Spawning `{} {}` in {}", command, args.join(" "), self.root_dir.display());
        let mut child = Command::new(command)
            .args(args)
            .current_dir(&self.root_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| SandboxError::Process(format!("Failed to spawn {command}: {error}")))?;

        let (output_tx, exit_tx, handle) = ProcessHandle::channel();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stderr_tx = output_tx.clone();
        tokio::spawn(async move {
            let stdout_pump = async move {
                if let Some(stdout) = stdout {
                    pump_lines(stdout, output_tx).await;
                }
            };
            let stderr_pump = async move {
                if let Some(stderr) = stderr {
                    pump_lines(stderr, stderr_tx).await;
                }
            };
            tokio::join!(stdout_pump, stderr_pump);

            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(error) => {
                    warn!("Failed to wait for process: {error}");
                    -1
                }
            };
            drop(exit_tx.send(code));
        });
        Ok(handle)
    }
}
