//! Persisted block records and the bounded newest-first history.

use crate::RedirectKind;
use crate::TabId;
use serde::Deserialize;
use serde::Serialize;

/// Default number of block records kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// One suppressed redirect as stored in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEntry {
    pub id: i64,
    pub timestamp: String,
    pub from: String,
    pub to: String,
    pub kind: RedirectKind,
    pub tab_id: TabId,
}

/// Newest-first ring of block entries. Eviction is by insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHistory {
    capacity: usize,
    entries: Vec<BlockEntry>,
}

impl BlockHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Rebuilds from persisted entries, dropping anything past capacity.
    pub fn from_entries(capacity: usize, mut entries: Vec<BlockEntry>) -> Self {
        entries.truncate(capacity);
        Self { capacity, entries }
    }

    pub fn record(&mut self, entry: BlockEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BlockEntry> {
        self.entries
    }
}

impl Default for BlockHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
