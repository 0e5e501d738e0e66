//! Command History
//!
//! Most-recent-first list of commands the assistant has suggested, unique and
//! bounded, persisted on every change so it survives restarts.
//!
//! Browsing works like a shell history: a cursor of `None` means "not
//! browsing", `Older` walks toward higher indices and `Newer` walks back.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::persistence::{Persistence, PersistenceError};

/// Storage key for the serialized history
pub const COMMAND_HISTORY_KEY: &str = "cogni_command_history";

/// Default number of commands kept
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Direction to move a history cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Older,
    Newer,
}

pub struct CommandHistoryStore {
    persistence: Arc<dyn Persistence>,
    entries: Vec<String>,
    limit: usize,
}

impl CommandHistoryStore {
    /// Load the persisted history, falling back to an empty one.
    pub fn open(persistence: Arc<dyn Persistence>, limit: usize) -> Self {
        let mut entries = load(persistence.as_ref());
        normalize(&mut entries, limit);
        Self {
            persistence,
            entries,
            limit,
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move `command` to the front, persist, and return the new history.
    ///
    /// A storage failure is logged; the in-memory history is still updated.
    pub fn record(&mut self, command: &str) -> &[String] {
        self.entries.retain(|c| c != command);
        self.entries.insert(0, command.to_string());
        self.entries.truncate(self.limit);

        match serde_json::to_string(&self.entries) {
            Ok(json) => {
                if let Err(e) = self.persistence.write(COMMAND_HISTORY_KEY, &json) {
                    error!(error = %e, "failed to save command history");
                }
            }
            Err(e) => error!(error = %e, "failed to serialize command history"),
        }
        debug!(command, len = self.entries.len(), "recorded command");

        &self.entries
    }

    pub fn navigate(&self, cursor: Option<usize>, direction: Direction) -> (Option<usize>, String) {
        navigate(&self.entries, cursor, direction)
    }
}

/// Read the persisted history. Missing or corrupt data yields an empty list.
pub fn load(persistence: &dyn Persistence) -> Vec<String> {
    match read_entries(persistence) {
        Ok(entries) => entries,
        Err(e @ PersistenceError::Corrupt(_)) => {
            warn!(error = %e, "command history is corrupt, starting empty");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "failed to load command history");
            Vec::new()
        }
    }
}

fn read_entries(persistence: &dyn Persistence) -> Result<Vec<String>, PersistenceError> {
    match persistence.read(COMMAND_HISTORY_KEY)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

/// Drop duplicates (keeping the most recent) and anything past `limit`
fn normalize(entries: &mut Vec<String>, limit: usize) {
    let mut seen = std::collections::HashSet::new();
    entries.retain(|c| seen.insert(c.clone()));
    entries.truncate(limit);
}

/// Step a history cursor one entry older or newer.
///
/// Clamped at both ends: asking for `Older` at the oldest entry, or `Newer`
/// when not browsing, returns the cursor unchanged. `None` maps to an empty
/// input line.
pub fn navigate(
    history: &[String],
    cursor: Option<usize>,
    direction: Direction,
) -> (Option<usize>, String) {
    if history.is_empty() {
        return (None, String::new());
    }
    // A stale cursor from a longer history is pulled back in range
    let cursor = cursor.map(|i| i.min(history.len() - 1));

    let next = match (direction, cursor) {
        (Direction::Older, None) => Some(0),
        (Direction::Older, Some(i)) => Some((i + 1).min(history.len() - 1)),
        (Direction::Newer, None) => None,
        (Direction::Newer, Some(0)) => None,
        (Direction::Newer, Some(i)) => Some(i - 1),
    };

    let value = next.map(|i| history[i].clone()).unwrap_or_default();
    (next, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn store_with(persistence: Arc<MemoryStore>) -> CommandHistoryStore {
        CommandHistoryStore::open(persistence, DEFAULT_HISTORY_LIMIT)
    }

    #[test]
    fn test_record_scenario() {
        let mut history = store_with(Arc::new(MemoryStore::new()));
        assert!(history.is_empty());

        assert_eq!(history.record("ls -la"), ["ls -la"]);
        assert_eq!(history.record("pwd"), ["pwd", "ls -la"]);
        assert_eq!(history.record("ls -la"), ["ls -la", "pwd"]);
    }

    #[test]
    fn test_record_persists_every_change() {
        let persistence = Arc::new(MemoryStore::new());
        let mut history = store_with(persistence.clone());
        history.record("git status");
        history.record("cargo test");

        assert_eq!(
            persistence.get(COMMAND_HISTORY_KEY).as_deref(),
            Some(r#"["cargo test","git status"]"#)
        );

        let reopened = store_with(persistence);
        assert_eq!(reopened.entries(), ["cargo test", "git status"]);
    }

    #[test]
    fn test_history_is_capped_and_unique() {
        let mut history = store_with(Arc::new(MemoryStore::new()));
        for i in 0..120 {
            history.record(&format!("echo {}", i % 70));
        }

        let entries = history.entries();
        assert_eq!(entries.len(), DEFAULT_HISTORY_LIMIT);
        let unique: std::collections::HashSet<_> = entries.iter().collect();
        assert_eq!(unique.len(), entries.len());
        assert_eq!(entries[0], "echo 49");
    }

    #[test]
    fn test_rerecord_keeps_other_entries() {
        let mut history = store_with(Arc::new(MemoryStore::new()));
        for cmd in ["a", "b", "c", "d"] {
            history.record(cmd);
        }
        let mut before: Vec<String> = history.entries().to_vec();
        history.record("b");
        let mut after: Vec<String> = history.entries().to_vec();

        assert_eq!(after[0], "b");
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn test_write_failure_keeps_history_usable() {
        let persistence = Arc::new(MemoryStore::new());
        persistence.set_fail_writes(true);
        let mut history = store_with(persistence.clone());

        assert_eq!(history.record("df -h"), ["df -h"]);
        assert!(persistence.get(COMMAND_HISTORY_KEY).is_none());
    }

    #[test]
    fn test_load_corrupt_or_missing_is_empty() {
        let corrupt = MemoryStore::new().with_value(COMMAND_HISTORY_KEY, "{not json");
        assert!(matches!(
            read_entries(&corrupt),
            Err(PersistenceError::Corrupt(_))
        ));
        assert!(load(&corrupt).is_empty());
        assert!(load(&MemoryStore::new()).is_empty());
    }

    #[test]
    fn test_open_normalizes_loaded_history() {
        let persistence = Arc::new(
            MemoryStore::new().with_value(COMMAND_HISTORY_KEY, r#"["ls","pwd","ls","top"]"#),
        );
        let history = CommandHistoryStore::open(persistence, 2);
        assert_eq!(history.entries(), ["ls", "pwd"]);
    }

    #[test]
    fn test_navigate_walks_and_clamps() {
        let history: Vec<String> = vec!["newest".into(), "middle".into(), "oldest".into()];

        let (cursor, value) = navigate(&history, None, Direction::Older);
        assert_eq!((cursor, value.as_str()), (Some(0), "newest"));
        let (cursor, value) = navigate(&history, cursor, Direction::Older);
        assert_eq!((cursor, value.as_str()), (Some(1), "middle"));
        let (cursor, value) = navigate(&history, cursor, Direction::Older);
        assert_eq!((cursor, value.as_str()), (Some(2), "oldest"));

        // Clamped at the oldest entry
        let (cursor, value) = navigate(&history, cursor, Direction::Older);
        assert_eq!((cursor, value.as_str()), (Some(2), "oldest"));

        let (cursor, _) = navigate(&history, cursor, Direction::Newer);
        let (cursor, value) = navigate(&history, cursor, Direction::Newer);
        assert_eq!((cursor, value.as_str()), (Some(0), "newest"));
        let (cursor, value) = navigate(&history, cursor, Direction::Newer);
        assert_eq!((cursor, value.as_str()), (None, ""));

        // Clamped when not browsing
        let (cursor, value) = navigate(&history, cursor, Direction::Newer);
        assert_eq!((cursor, value.as_str()), (None, ""));
    }

    #[test]
    fn test_navigate_empty_history() {
        assert_eq!(navigate(&[], None, Direction::Older), (None, String::new()));
        assert_eq!(navigate(&[], Some(3), Direction::Newer), (None, String::new()));
    }
}
