//! In-memory sandbox backend.
//!
//! Keeps the whole project in a path-keyed map. Used by tests and dry runs; single
//! operations can be made to fail on chosen paths and boots can be delayed or
//! failed to exercise the boot guard.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Error as IoError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use beesto_core::IgnoreLock as _;

use crate::backend::{DirEntry, ProcessHandle, SandboxBackend};
use crate::error::{SandboxError, SandboxResult};

/// Backend operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `read_file`
    Read,
    /// `write_file`
    Write,
    /// `read_directory`
    ReadDirectory,
    /// `mkdir`
    Mkdir,
    /// `rename`, matched on the source path
    Rename,
    /// `remove`
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(String),
    Directory,
}

/// Scripted result of a spawned command.
#[derive(Debug, Clone)]
struct ScriptedProcess {
    output: Vec<String>,
    exit_code: i32,
}

/// Sandbox backend holding files in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Nodes keyed by relative path; the root is implicit
    nodes: Mutex<BTreeMap<String, Node>>,
    /// Injected failures
    failures: Mutex<HashSet<(Operation, String)>>,
    /// Scripted processes keyed by the full command line
    processes: Mutex<HashMap<String, ScriptedProcess>>,
    /// Command lines spawned so far
    spawned: Mutex<Vec<String>>,
    /// Paths successfully written, in order
    writes: Mutex<Vec<String>>,
    /// Number of boot attempts
    boot_attempts: AtomicUsize,
    /// Number of upcoming boot attempts that fail
    failing_boots: AtomicUsize,
    /// Artificial boot latency
    boot_delay: Duration,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every boot take `delay`.
    #[must_use]
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// Makes the next `count` boot attempts fail.
    #[must_use]
    pub fn with_failing_boots(self, count: usize) -> Self {
        self.failing_boots.store(count, Ordering::SeqCst);
        self
    }

    /// Seeds a file, creating parent directories.
    #[must_use]
    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut nodes = self.nodes.lock_ignore_poison();
            let path = normalize(path);
            insert_ancestors(&mut nodes, &path);
            nodes.insert(path, Node::File(content.to_owned()));
        }
        self
    }

    /// Scripts the output and exit code of a command line such as `npm install`.
    #[must_use]
    pub fn with_process(self, command_line: &str, output: &[&str], exit_code: i32) -> Self {
        self.processes.lock_ignore_poison().insert(
            command_line.to_owned(),
            ScriptedProcess {
                output: output.iter().map(|&line| line.to_owned()).collect(),
                exit_code,
            },
        );
        self
    }

    /// Makes `operation` fail on `path` until [`Self::clear_failures`] is called.
    pub fn fail_on(&self, operation: Operation, path: &str) {
        self.failures
            .lock_ignore_poison()
            .insert((operation, normalize(path)));
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.failures.lock_ignore_poison().clear();
    }

    /// Number of boot attempts so far.
    pub fn boot_attempts(&self) -> usize {
        self.boot_attempts.load(Ordering::SeqCst)
    }

    /// Command lines spawned so far.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock_ignore_poison().clone()
    }

    /// Paths written through `write_file`, one entry per write.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock_ignore_poison().clone()
    }

    /// Content of a file, if present.
    pub fn file(&self, path: &str) -> Option<String> {
        match self.nodes.lock_ignore_poison().get(&normalize(path)) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    /// Whether any node exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        path.is_empty() || self.nodes.lock_ignore_poison().contains_key(&path)
    }

    fn check(&self, operation: Operation, path: &str) -> SandboxResult<()> {
        if self
            .failures
            .lock_ignore_poison()
            .contains(&(operation, path.to_owned()))
        {
            return Err(SandboxError::Io(IoError::other(format!(
                "injected {operation:?} failure on '{path}'"
            ))));
        }
        Ok(())
    }
}

/// Strips separators from both ends; the root is the empty string.
fn normalize(path: &str) -> String {
    path.trim_matches('/').to_owned()
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn is_directory(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
    path.is_empty() || nodes.get(path) == Some(&Node::Directory)
}

fn insert_ancestors(nodes: &mut BTreeMap<String, Node>, path: &str) {
    let mut ancestor = parent_of(path);
    while !ancestor.is_empty() {
        nodes
            .entry(ancestor.to_owned())
            .or_insert(Node::Directory);
        ancestor = parent_of(ancestor);
    }
}

/// Keys of `path` and everything below it.
fn subtree(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
    let prefix = format!("{path}/");
    nodes
        .keys()
        .filter(|key| *key == path || key.starts_with(&prefix))
        .cloned()
        .collect()
}

#[async_trait]
impl SandboxBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn boot(&self) -> SandboxResult<()> {
        self.boot_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.boot_delay.is_zero() {
            sleep(self.boot_delay).await;
        }
        let failed = self
            .failing_boots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failed {
            return Err(SandboxError::Boot("simulated boot failure".to_owned()));
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> SandboxResult<String> {
        let path = normalize(path);
        self.check(Operation::Read, &path)?;
        match self.nodes.lock_ignore_poison().get(&path) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Directory) => Err(SandboxError::IsADirectory(path)),
            None if path.is_empty() => Err(SandboxError::IsADirectory(path)),
            None => Err(SandboxError::NotFound(path)),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> SandboxResult<()> {
        let path = normalize(path);
        self.check(Operation::Write, &path)?;
        let mut nodes = self.nodes.lock_ignore_poison();
        if is_directory(&nodes, &path) {
            return Err(SandboxError::IsADirectory(path));
        }
        let parent = parent_of(&path);
        if !is_directory(&nodes, parent) {
            return Err(SandboxError::NotFound(parent.to_owned()));
        }
        nodes.insert(path.clone(), Node::File(content.to_owned()));
        drop(nodes);
        self.writes.lock_ignore_poison().push(path);
        Ok(())
    }

    async fn read_directory(&self, path: &str) -> SandboxResult<Vec<DirEntry>> {
        let path = normalize(path);
        self.check(Operation::ReadDirectory, &path)?;
        let nodes = self.nodes.lock_ignore_poison();
        if !is_directory(&nodes, &path) {
            return Err(if nodes.contains_key(&path) {
                SandboxError::NotADirectory(path)
            } else {
                SandboxError::NotFound(path)
            });
        }
        let entries = nodes
            .iter()
            .filter(|(key, _)| !key.is_empty() && parent_of(key) == path)
            .map(|(key, node)| DirEntry {
                name: key.rsplit('/').next().unwrap_or(key).to_owned(),
                is_directory: *node == Node::Directory,
            })
            .collect();
        Ok(entries)
    }

    async fn mkdir(&self, path: &str) -> SandboxResult<()> {
        let path = normalize(path);
        self.check(Operation::Mkdir, &path)?;
        let mut nodes = self.nodes.lock_ignore_poison();
        let mut current = String::new();
        for part in path.split('/').filter(|part| !part.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            match nodes.get(&current) {
                Some(Node::File(_)) => return Err(SandboxError::NotADirectory(current)),
                Some(Node::Directory) => {}
                None => {
                    nodes.insert(current.clone(), Node::Directory);
                }
            }
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> SandboxResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        self.check(Operation::Rename, &from)?;
        let mut nodes = self.nodes.lock_ignore_poison();
        if !nodes.contains_key(&from) {
            return Err(SandboxError::NotFound(from));
        }
        if !is_directory(&nodes, parent_of(&to)) {
            return Err(SandboxError::NotFound(parent_of(&to).to_owned()));
        }
        for key in subtree(&nodes, &from) {
            if let Some(node) = nodes.remove(&key) {
                let moved = format!("{to}{}", &key[from.len()..]);
                nodes.insert(moved, node);
            }
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> SandboxResult<()> {
        let path = normalize(path);
        self.check(Operation::Remove, &path)?;
        if path.is_empty() {
            return Err(SandboxError::InvalidPath(
                "Refusing to remove the sandbox root".to_owned(),
            ));
        }
        let mut nodes = self.nodes.lock_ignore_poison();
        if !nodes.contains_key(&path) {
            return Err(SandboxError::NotFound(path));
        }
        for key in subtree(&nodes, &path) {
            nodes.remove(&key);
        }
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> SandboxResult<ProcessHandle> {
        let command_line = if args.is_empty() {
            command.to_owned()
        } else {
            format!("{command} {}", args.join(" "))
        };
        self.spawned.lock_ignore_poison().push(command_line.clone());
        let scripted = self.processes.lock_ignore_poison().get(&command_line).cloned();
        Ok(match scripted {
            Some(process) => ProcessHandle::finished(process.output, process.exit_code),
            None => ProcessHandle::finished([format!("{command}: command not found")], 127),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_listing_and_kinds() {
        let backend = MemoryBackend::new()
            .with_file("package.json", "{}")
            .with_file("src/app/page.tsx", "page");

        let root = backend.read_directory("/").await.unwrap();
        let names: Vec<_> = root.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["package.json", "src"]);
        assert!(backend.is_directory("/src/app").await);
        assert!(!backend.is_directory("/src/app/page.tsx").await);
        assert!(matches!(
            backend.read_directory("package.json").await,
            Err(SandboxError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_write_requires_parent() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.write_file("src/new.ts", "x").await,
            Err(SandboxError::NotFound(_))
        ));
        backend.mkdir("src").await.unwrap();
        backend.write_file("src/new.ts", "x").await.unwrap();
        assert_eq!(backend.file("/src/new.ts").as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let backend = MemoryBackend::new()
            .with_file("src/components/Hero.tsx", "hero")
            .with_file("src/componentsX/Other.tsx", "other");

        backend.rename("src/components", "src/ui").await.unwrap();
        assert_eq!(backend.file("src/ui/Hero.tsx").as_deref(), Some("hero"));
        assert!(!backend.exists("src/components"));
        assert!(backend.exists("src/componentsX/Other.tsx"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = MemoryBackend::new().with_file("a.txt", "a");
        backend.fail_on(Operation::Remove, "/a.txt");
        assert!(backend.remove("a.txt").await.is_err());
        assert!(backend.exists("a.txt"));

        backend.clear_failures();
        backend.remove("a.txt").await.unwrap();
        assert!(!backend.exists("a.txt"));
    }

    #[tokio::test]
    async fn test_scripted_and_unknown_processes() {
        let backend = MemoryBackend::new().with_process("npm install", &["added 3 packages"], 0);

        let mut install = backend
            .spawn("npm", &["install".to_owned()])
            .await
            .unwrap();
        assert_eq!(install.next_line().await.as_deref(), Some("added 3 packages"));
        assert_eq!(install.wait().await.unwrap(), 0);

        let unknown = backend.spawn("cargo", &[]).await.unwrap();
        assert_eq!(unknown.wait().await.unwrap(), 127);
        assert_eq!(backend.spawned(), ["npm install", "cargo"]);
    }
}
