//! Console log collecting process output and runtime messages.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beesto_core::IgnoreLock as _;

/// Severity of a console entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// Plain output
    Log,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Which entries [`ConsoleLog::filtered`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFilter {
    /// Every entry
    #[default]
    All,
    /// Only `Error` entries
    Errors,
    /// Only `Warn` entries
    Warnings,
}

impl ConsoleFilter {
    fn admits(self, level: ConsoleLevel) -> bool {
        match self {
            Self::All => true,
            Self::Errors => level == ConsoleLevel::Error,
            Self::Warnings => level == ConsoleLevel::Warn,
        }
    }
}

/// One console line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// Unique entry id
    pub id: String,
    /// Severity
    pub level: ConsoleLevel,
    /// Message text
    pub message: String,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ConsoleState {
    entries: Vec<ConsoleEntry>,
    filter: ConsoleFilter,
}

/// Shared, cloneable console log.
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    state: Arc<Mutex<ConsoleState>>,
}

impl ConsoleLog {
    /// Creates an empty log showing all entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an entry.
    pub fn add(&self, level: ConsoleLevel, message: impl Into<String>) {
        let entry = ConsoleEntry {
            id: Uuid::new_v4().simple().to_string(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.state.lock_ignore_poison().entries.push(entry);
    }

    /// Every entry in arrival order.
    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.state.lock_ignore_poison().entries.clone()
    }

    /// Entries admitted by the current filter.
    pub fn filtered(&self) -> Vec<ConsoleEntry> {
        let state = self.state.lock_ignore_poison();
        state
            .entries
            .iter()
            .filter(|entry| state.filter.admits(entry.level))
            .cloned()
            .collect()
    }

    /// Current filter.
    pub fn filter(&self) -> ConsoleFilter {
        self.state.lock_ignore_poison().filter
    }

    /// Changes the filter.
    pub fn set_filter(&self, filter: ConsoleFilter) {
        self.state.lock_ignore_poison().filter = filter;
    }

    /// Removes every entry; the filter is kept.
    pub fn clear(&self) {
        self.state.lock_ignore_poison().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_selects_levels() {
        let console = ConsoleLog::new();
        console.add(ConsoleLevel::Log, "ready on :3000");
        console.add(ConsoleLevel::Warn, "deprecated option");
        console.add(ConsoleLevel::Error, "module not found");
        console.add(ConsoleLevel::Info, "compiled");

        assert_eq!(console.filtered().len(), 4);

        console.set_filter(ConsoleFilter::Errors);
        let errors = console.filtered();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "module not found");

        console.set_filter(ConsoleFilter::Warnings);
        assert_eq!(console.filtered()[0].level, ConsoleLevel::Warn);
    }

    #[test]
    fn test_clear_keeps_filter() {
        let console = ConsoleLog::new();
        console.set_filter(ConsoleFilter::Errors);
        console.add(ConsoleLevel::Error, "boom");
        console.clear();

        assert!(console.entries().is_empty());
        assert_eq!(console.filter(), ConsoleFilter::Errors);
    }
}
