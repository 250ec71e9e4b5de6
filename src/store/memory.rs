//! Volatile block store

use super::{verify, Block, BlockStore, Hash, DEFAULT_COMPRESSION_LEVEL};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An in-memory block store, mostly useful for tests and scratch trees
pub struct MemoryStore {
    blocks: RwLock<HashMap<Hash, Vec<u8>>>,
    writes: AtomicUsize,
    level: i32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_compression(DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn with_compression(level: i32) -> Self {
        MemoryStore {
            blocks: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            level,
        }
    }

    /// Number of distinct blocks held
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Number of blocks actually written (deduplicated puts excluded)
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Drop a block, simulating a store that lost data
    pub fn evict(&self, hash: &Hash) -> bool {
        self.blocks.write().remove(hash).is_some()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryStore {
    fn put(&self, block: &Block) -> Result<Hash> {
        let (hash, bytes) = block.encode(self.level)?;

        let mut blocks = self.blocks.write();
        if !blocks.contains_key(&hash) {
            blocks.insert(hash, bytes);
            self.writes.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(hash = %hash.short(), kind = ?block.kind, "stored block");
        }
        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<Block> {
        let blocks = self.blocks.read();
        let bytes = blocks.get(hash).ok_or(Error::NotFound(*hash))?;
        verify(hash, bytes)
    }

    fn contains(&self, hash: &Hash) -> bool {
        self.blocks.read().contains_key(hash)
    }
}
