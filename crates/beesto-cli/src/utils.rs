//! Utility functions for CLI operations

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use beesto_core::FileNode;
use beesto_core::config::WorkspaceConfig;

/// Name of the per-project state directory.
const BEESTO_DIR: &str = ".beesto";

/// Get the Beesto folder path, respecting `BEESTO_FOLDER` environment variable
///
/// If `BEESTO_FOLDER` is set, use it. Otherwise default to `project/.beesto`
pub fn get_beesto_folder(project_root: &Path) -> PathBuf {
    env::var("BEESTO_FOLDER").map_or_else(|_| project_root.join(BEESTO_DIR), PathBuf::from)
}

/// Adds the state directory to the tree's skip list.
pub fn with_state_dir_skipped(mut config: WorkspaceConfig) -> WorkspaceConfig {
    if !config.skipped_directories.iter().any(|name| name == BEESTO_DIR) {
        config.skipped_directories.push(BEESTO_DIR.to_owned());
    }
    config
}

/// Writes `nodes` as an indented listing; directories end with `/`.
///
/// # Errors
/// Returns the writer's error.
pub fn write_tree(out: &mut impl Write, nodes: &[FileNode], depth: usize) -> io::Result<()> {
    for node in nodes {
        let suffix = if node.is_directory() { "/" } else { "" };
        writeln!(out, "{}{}{suffix}", "  ".repeat(depth), node.name)?;
        if let Some(children) = &node.children {
            write_tree(out, children, depth + 1)?;
        }
    }
    Ok(())
}
