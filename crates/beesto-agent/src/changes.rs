//! File changes carried by an execute-phase response.
//!
//! The preferred shape is a JSON object `{"changes": [{path, content, operation}]}`
//! somewhere in the response. Responses without one may instead carry code fences
//! tagged ```` ```filename:path ````; each fence becomes a `create` change.
//! Entries of a change set that do not match the change schema are skipped and
//! counted so the caller can report them.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, from_value};
use tracing::debug;

use beesto_core::FileChange;
use beesto_core::extract::extract_json;
use beesto_core::files::absolute_path;

/// Fence opening with a `filename:` tag, its body, and the closing fence.
static FILENAME_FENCE: LazyLock<Regex> =
    LazyLock::new(
        || match Regex::new(r"(?m)^```filename:([^\s`]+)[^\n]*\n((?s:.*?))^```") {
            Ok(regex) => regex,
            Err(err) => panic!("Filename fence regex is invalid: {err}"),
        },
    );

/// File changes read from one execute-phase response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedChanges {
    /// Well-formed changes, in response order
    pub changes: Vec<FileChange>,
    /// Change-set entries that did not match the change schema
    pub rejected: usize,
}

/// Reads the file changes out of an execute-phase response.
///
/// Paths are normalised to project-absolute form. A `changes` value that is not
/// an array counts as one rejected entry.
pub fn parse_changes(response: &str) -> ParsedChanges {
    let change_set =
        extract_json(response).and_then(|mut payload| payload.get_mut("changes").map(Value::take));
    let mut parsed = match change_set {
        Some(Value::Array(entries)) => from_entries(entries),
        Some(other) => {
            debug!("Change set is not an array: {other}");
            ParsedChanges {
                changes: Vec::new(),
                rejected: 1,
            }
        }
        None => ParsedChanges {
            changes: fenced_changes(response),
            rejected: 0,
        },
    };
    parsed
        .changes
        .retain(|change| !change.path.trim_matches('/').is_empty());
    for change in &mut parsed.changes {
        change.path = absolute_path(change.path.trim());
    }
    debug!(
        "Parsed {} file changes, rejected {}",
        parsed.changes.len(),
        parsed.rejected
    );
    parsed
}

fn from_entries(entries: Vec<Value>) -> ParsedChanges {
    let mut parsed = ParsedChanges::default();
    for entry in entries {
        match from_value::<FileChange>(entry) {
            Ok(change) => parsed.changes.push(change),
            Err(err) => {
                debug!("Skipping malformed file change: {err}");
                parsed.rejected += 1;
            }
        }
    }
    parsed
}

fn fenced_changes(response: &str) -> Vec<FileChange> {
    FILENAME_FENCE
        .captures_iter(response)
        .map(|captures| FileChange::create(&captures[1], &captures[2]))
        .collect()
}
