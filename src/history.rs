//! Modification History - linear undo/redo stack over dashboard
//! configuration snapshots. No branching: pushing after an undo prunes the
//! redo tail.

use crate::config::DashboardConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationHistory {
    snapshots: Vec<DashboardConfig>,
    /// Index of the active snapshot; always `0 <= pointer < snapshots.len()`.
    pointer: usize,
    /// Human-readable description of the most recent transition.
    last_changes: Vec<String>,
}

impl ModificationHistory {
    pub fn new(initial: DashboardConfig) -> Self {
        Self {
            snapshots: vec![initial],
            pointer: 0,
            last_changes: Vec::new(),
        }
    }

    /// The active configuration.
    pub fn current(&self) -> &DashboardConfig {
        &self.snapshots[self.pointer]
    }

    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    pub fn can_redo(&self) -> bool {
        self.pointer + 1 < self.snapshots.len()
    }

    pub fn last_changes(&self) -> &[String] {
        &self.last_changes
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Append a new snapshot after the pointer, discarding any redo branch,
    /// and record its change descriptions.
    pub fn push(&mut self, config: DashboardConfig, changes: Vec<String>) {
        self.snapshots.truncate(self.pointer + 1);
        self.snapshots.push(config);
        self.pointer += 1;
        self.last_changes = changes;
    }

    /// Step back one snapshot. No-op (returns false) when there is nothing
    /// to undo; never errors.
    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.pointer -= 1;
        self.last_changes = vec!["Undid last modification".to_string()];
        true
    }

    /// Step forward one snapshot. No-op (returns false) when there is
    /// nothing to redo; never errors.
    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.pointer += 1;
        self.last_changes = vec!["Redid modification".to_string()];
        true
    }
}
