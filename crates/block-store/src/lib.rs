//! Content-addressed map from block hash to [`BlockInfo`], bounded by
//! pruning.
//!
//! Mirrors the teacher's single-write-lock-per-component convention (§5):
//! the store exposes only methods that take the minimal lock region
//! internally; no "caller must hold the lock" contract leaks into the public
//! API.

use engine_metrics::BlockStoreMetrics;
use engine_primitives::{BlockInfo, Hash};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockStoreError {
    #[error("block {0} already present with different contents")]
    Conflict(Hash),
}

/// A content-addressed, bounded store of block metadata.
///
/// Blocks are immutable once inserted (re-inserting the same hash with
/// identical contents is a no-op; inserting different contents under an
/// already-known hash is rejected as a [`BlockStoreError::Conflict`]).
#[derive(Debug)]
pub struct BlockStore {
    inner: RwLock<Inner>,
    /// Soft cap on the number of tracked blocks; pruning evicts the oldest
    /// (lowest-number) entries once this is exceeded by more than a single
    /// insertion's worth of slack.
    capacity: usize,
    metrics: BlockStoreMetrics,
}

#[derive(Debug, Default)]
struct Inner {
    blocks: HashMap<Hash, BlockInfo>,
}

impl BlockStore {
    pub fn new(capacity: usize) -> Self {
        Self { inner: RwLock::new(Inner::default()), capacity, metrics: BlockStoreMetrics::default() }
    }

    /// Inserts a block, pruning the oldest entries first if the store is over
    /// capacity afterward.
    pub fn put(&self, info: BlockInfo) -> Result<(), BlockStoreError> {
        {
            let mut guard = self.inner.write();
            if let Some(existing) = guard.blocks.get(&info.hash) {
                if *existing != info {
                    return Err(BlockStoreError::Conflict(info.hash));
                }
                return Ok(());
            }
            guard.blocks.insert(info.hash, info);
            self.metrics.blocks_inserted.increment(1);
            self.metrics.stored.set(guard.blocks.len() as f64);
        }
        self.prune_if_needed();
        Ok(())
    }

    pub fn get(&self, hash: Hash) -> Option<BlockInfo> {
        self.inner.read().blocks.get(&hash).copied()
    }

    pub fn contains(&self, hash: Hash) -> bool {
        self.inner.read().blocks.contains_key(&hash)
    }

    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_if_needed(&self) {
        let mut guard = self.inner.write();
        if guard.blocks.len() <= self.capacity {
            return;
        }
        let overflow = guard.blocks.len() - self.capacity;
        let mut by_number: Vec<(u64, Hash)> =
            guard.blocks.values().map(|b| (b.number, b.hash)).collect();
        by_number.sort_unstable_by_key(|(number, _)| *number);
        for (_, hash) in by_number.into_iter().take(overflow) {
            guard.blocks.remove(&hash);
            self.metrics.blocks_pruned.increment(1);
        }
        self.metrics.stored.set(guard.blocks.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(n: u64, hash: Hash, parent: Hash) -> BlockInfo {
        BlockInfo { hash, parent_hash: parent, number: n, timestamp: 1000 + n, slot: n }
    }

    fn h(byte: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        Hash::from(bytes)
    }

    #[test]
    fn put_and_get_round_trips() {
        let store = BlockStore::new(10);
        let block = info(1, h(1), h(0));
        store.put(block).unwrap();
        assert_eq!(store.get(h(1)), Some(block));
        assert!(store.contains(h(1)));
        assert!(!store.contains(h(2)));
    }

    #[test]
    fn reinserting_identical_block_is_a_no_op() {
        let store = BlockStore::new(10);
        let block = info(1, h(1), h(0));
        store.put(block).unwrap();
        store.put(block).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn conflicting_reinsert_is_rejected() {
        let store = BlockStore::new(10);
        store.put(info(1, h(1), h(0))).unwrap();
        let err = store.put(info(2, h(1), h(0))).unwrap_err();
        assert_eq!(err, BlockStoreError::Conflict(h(1)));
    }

    #[test]
    fn pruning_evicts_lowest_numbered_blocks_first() {
        let store = BlockStore::new(3);
        for i in 1..=5u8 {
            store.put(info(i as u64, h(i), h(i - 1))).unwrap();
        }
        assert_eq!(store.len(), 3);
        assert!(!store.contains(h(1)));
        assert!(!store.contains(h(2)));
        assert!(store.contains(h(5)));
    }
}
