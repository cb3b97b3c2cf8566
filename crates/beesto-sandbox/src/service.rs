//! Lazily-booted sandbox service shared by the stores and the agent.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use beesto_core::files::{absolute_path, relative_path};

use crate::backend::{DirEntry, ProcessHandle, SandboxBackend};
use crate::console::{ConsoleLevel, ConsoleLog};
use crate::error::SandboxResult;
use crate::template::MountTree;

/// Front door to a sandbox backend.
///
/// Every operation boots the backend first; the first caller performs the boot and
/// concurrent callers wait for it. A failed boot is not cached, so the next call
/// tries again. Paths may carry a leading `/`; it is stripped before delegating.
pub struct Sandbox {
    /// Underlying runtime
    backend: Arc<dyn SandboxBackend>,
    /// Set once the backend booted successfully
    booted: OnceCell<()>,
    /// Process output and runtime messages
    console: ConsoleLog,
}

impl Sandbox {
    /// Wraps a backend; nothing is booted until the first operation.
    pub fn new(backend: Arc<dyn SandboxBackend>) -> Self {
        Self {
            backend,
            booted: OnceCell::new(),
            console: ConsoleLog::new(),
        }
    }

    /// Console log fed by spawned processes.
    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    /// Whether the backend has booted.
    pub fn is_booted(&self) -> bool {
        self.booted.initialized()
    }

    /// Boots the backend unless it already is.
    ///
    /// # Errors
    /// Returns the backend's boot error.
    pub async fn ensure_booted(&self) -> SandboxResult<()> {
        self.booted
            .get_or_try_init(|| async {
                info!("Booting {} sandbox", self.backend.name());
                let booted = self.backend.boot().await;
                if let Err(error) = &booted {
                    warn!("Sandbox boot failed: {error}");
                    self.console.add(ConsoleLevel::Error, error.to_string());
                }
                booted
            })
            .await?;
        Ok(())
    }

    /// Reads a file.
    ///
    /// # Errors
    /// Returns an error if booting or reading fails.
    pub async fn read_file(&self, path: &str) -> SandboxResult<String> {
        self.ensure_booted().await?;
        self.backend.read_file(relative_path(path)).await
    }

    /// Writes a file.
    ///
    /// # Errors
    /// Returns an error if booting or writing fails.
    pub async fn write_file(&self, path: &str, content: &str) -> SandboxResult<()> {
        self.ensure_booted().await?;
        self.backend.write_file(relative_path(path), content).await
    }

    /// Lists a directory.
    ///
    /// # Errors
    /// Returns an error if booting fails or the path is not a directory.
    pub async fn read_directory(&self, path: &str) -> SandboxResult<Vec<DirEntry>> {
        self.ensure_booted().await?;
        self.backend.read_directory(relative_path(path)).await
    }

    /// Whether `path` is a directory; `false` when the sandbox cannot boot.
    pub async fn is_directory(&self, path: &str) -> bool {
        if self.ensure_booted().await.is_err() {
            return false;
        }
        self.backend.is_directory(relative_path(path)).await
    }

    /// Creates a directory and its parents.
    ///
    /// # Errors
    /// Returns an error if booting or creation fails.
    pub async fn mkdir(&self, path: &str) -> SandboxResult<()> {
        self.ensure_booted().await?;
        self.backend.mkdir(relative_path(path)).await
    }

    /// Moves a file or directory.
    ///
    /// # Errors
    /// Returns an error if booting or the move fails.
    pub async fn rename(&self, from: &str, to: &str) -> SandboxResult<()> {
        self.ensure_booted().await?;
        self.backend
            .rename(relative_path(from), relative_path(to))
            .await
    }

    /// Removes a file or directory recursively.
    ///
    /// # Errors
    /// Returns an error if booting or removal fails.
    pub async fn remove(&self, path: &str) -> SandboxResult<()> {
        self.ensure_booted().await?;
        self.backend.remove(relative_path(path)).await
    }

    /// Writes a tree into the sandbox root.
    ///
    /// # Errors
    /// Returns an error if booting or any write fails.
    pub async fn mount(&self, tree: &MountTree) -> SandboxResult<()> {
        self.ensure_booted().await?;
        self.backend.mount(tree).await
    }

    /// Reads every file into a map keyed by project-absolute path.
    ///
    /// Files that cannot be read are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if booting fails or a directory cannot be listed.
    pub async fn read_all_files(&self) -> SandboxResult<BTreeMap<String, String>> {
        self.ensure_booted().await?;
        let mut files = BTreeMap::new();
        let mut pending = vec![String::new()];
        while let Some(directory) = pending.pop() {
            for entry in self.backend.read_directory(&directory).await? {
                let path = if directory.is_empty() {
                    entry.name
                } else {
                    format!("{directory}/{}", entry.name)
                };
                if entry.is_directory {
                    pending.push(path);
                    continue;
                }
                match self.backend.read_file(&path).await {
                    Ok(content) => {
                        files.insert(absolute_path(&path), content);
                    }
                    Err(error) => warn!("Failed to read file {path}: {error}"),
                }
            }
        }
        Ok(files)
    }

    /// Starts a process in the sandbox.
    ///
    /// # Errors
    /// Returns an error if booting fails or the process cannot start.
    pub async fn spawn(&self, command: &str, args: &[String]) -> SandboxResult<ProcessHandle> {
        self.ensure_booted().await?;
        self.backend.spawn(command, args).await
    }

    /// Runs a command to completion, copying its output into the console log.
    ///
    /// # Errors
    /// Returns an error if booting fails or the process cannot be supervised.
    pub async fn run_command(&self, command: &str, args: &[String]) -> SandboxResult<i32> {
        let mut process = self.spawn(command, args).await?;
        while let Some(line) = process.next_line().await {
            debug!("[{command}] {line}");
            self.console.add(ConsoleLevel::Log, line);
        }
        let exit_code = process.wait().await?;
        if exit_code != 0 {
            self.console.add(
                ConsoleLevel::Error,
                format!("{command} exited with code {exit_code}"),
            );
        }
        Ok(exit_code)
    }

    /// Runs `npm install`; succeeds iff it exits with code 0.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started.
    pub async fn install_dependencies(&self) -> SandboxResult<bool> {
        let exit_code = self.run_command("npm", &["install".to_owned()]).await?;
        Ok(exit_code == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::template::starter_template;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_boot() {
        let backend = Arc::new(MemoryBackend::new().with_boot_delay(Duration::from_millis(50)));
        let sandbox = Sandbox::new(Arc::clone(&backend) as Arc<dyn SandboxBackend>);

        let (first, second, _) = tokio::join!(
            sandbox.ensure_booted(),
            sandbox.mkdir("/src"),
            sandbox.is_directory("/src"),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(backend.boot_attempts(), 1);
        assert!(sandbox.is_booted());
    }

    #[tokio::test]
    async fn test_failed_boot_is_retried() {
        let backend = Arc::new(MemoryBackend::new().with_failing_boots(1));
        let sandbox = Sandbox::new(Arc::clone(&backend) as Arc<dyn SandboxBackend>);

        assert!(sandbox.read_directory("/").await.is_err());
        assert!(!sandbox.is_booted());
        assert_eq!(sandbox.console().entries().len(), 1);

        sandbox.read_directory("/").await.unwrap();
        assert_eq!(backend.boot_attempts(), 2);
    }

    #[tokio::test]
    async fn test_mount_and_read_all_files() {
        let sandbox = Sandbox::new(Arc::new(MemoryBackend::new()));
        sandbox.mount(&starter_template()).await.unwrap();

        let files = sandbox.read_all_files().await.unwrap();
        assert!(files.contains_key("/package.json"));
        assert!(files.contains_key("/src/app/page.tsx"));
        assert!(files["/src/app/layout.tsx"].contains("RootLayout"));
    }

    #[tokio::test]
    async fn test_install_dependencies_reports_exit_status() {
        let backend = MemoryBackend::new().with_process(
            "npm install",
            &["added 312 packages", "found 0 vulnerabilities"],
            0,
        );
        let sandbox = Sandbox::new(Arc::new(backend));
        assert!(sandbox.install_dependencies().await.unwrap());
        assert_eq!(sandbox.console().entries().len(), 2);

        let failing = Sandbox::new(Arc::new(MemoryBackend::new()));
        assert!(!failing.install_dependencies().await.unwrap());
        let errors: Vec<_> = failing
            .console()
            .entries()
            .into_iter()
            .filter(|entry| entry.level == ConsoleLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
    }
}
