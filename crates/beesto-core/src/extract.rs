//! Best-effort structured extraction from free-form model output.
//!
//! Models wrap JSON in prose and code fences. These helpers look for the widest
//! `{ ... }` span and parse it; they never fail, callers branch on `Option`.

use serde::de::DeserializeOwned;
use serde_json::{Value, from_str};

/// Finds the first `{` through the last `}` in `text` and parses it as JSON.
///
/// Returns `None` when no such span exists or it is not valid JSON.
pub fn extract_json(text: &str) -> Option<Value> {
    extract_as(text)
}

/// Like [`extract_json`], then deserializes into `T`.
///
/// Returns `None` if the JSON does not match `T`'s shape.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    from_str(&text[start..=end]).ok()
}
