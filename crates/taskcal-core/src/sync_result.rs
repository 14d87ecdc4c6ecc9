//! Outcome of a synchronization pass.

use serde::{Deserialize, Serialize};

/// Result of syncing one provider, reported to the UI and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// True when no error was recorded.
    pub success: bool,
    /// Number of entities pulled or pushed successfully.
    pub synced_count: usize,
    /// Human-readable messages for skipped items and failures.
    pub errors: Vec<String>,
}

impl SyncResult {
    /// Creates a successful result.
    pub fn ok(synced_count: usize) -> Self {
        Self {
            success: true,
            synced_count,
            errors: Vec::new(),
        }
    }

    /// Creates a failed result carrying a single message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            synced_count: 0,
            errors: vec![error.into()],
        }
    }

    /// Records a skipped item or failure; the result is no longer successful.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.success = false;
        self.errors.push(error.into());
    }

    /// Folds another partial result into this one.
    pub fn merge(&mut self, other: SyncResult) {
        self.synced_count += other.synced_count;
        self.success &= other.success;
        self.errors.extend(other.errors);
    }
}
