use std::sync::{PoisonError, RwLock};

use ahash::AHashMap;

use super::{Direction, TuneKey};

/// Shape-keyed table of tuned block widths.
///
/// Reads take a shared lock. The first width recorded for a key wins, so
/// threads racing to tune the same shape all end up with the same answer.
#[derive(Default)]
pub struct TuningCache {
    entries: RwLock<AHashMap<(Direction, TuneKey), usize>>,
}

impl TuningCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, direction: Direction, key: TuneKey) -> Option<usize> {
        // Entries are plain integers, a poisoned lock still holds valid data.
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&(direction, key)).copied()
    }

    /// Records `block_size` unless the key is already tuned, and returns the
    /// width stored for the key.
    pub fn insert(&self, direction: Direction, key: TuneKey, block_size: usize) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *entries.entry((direction, key)).or_insert(block_size)
    }

    /// Snapshot of all tuned entries, sorted by direction and key.
    pub fn entries(&self) -> Vec<(Direction, TuneKey, usize)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<_> = entries
            .iter()
            .map(|(&(direction, key), &block_size)| (direction, key, block_size))
            .collect();
        snapshot.sort_unstable();
        snapshot
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
