//! Content-addressed block storage
//!
//! Tree nodes are written as [`Block`]s addressed by the BLAKE3 hash of their
//! content and compressed with zstd. Two backends are provided: an in-memory
//! map and a single-file store with named roots.

mod block;
mod file;
mod hash;
mod memory;

pub use block::{Block, BlockKind, Link};
pub use file::FileStore;
pub use hash::Hash;
pub use memory::MemoryStore;

use crate::Result;
use std::sync::Arc;

/// Default zstd level for stored blocks
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// A content-addressed block store
///
/// `put` must be idempotent: storing a block that already exists returns the
/// same address without writing it again.
pub trait BlockStore: Send + Sync {
    /// Store a block, returning its content address
    fn put(&self, block: &Block) -> Result<Hash>;

    /// Fetch a block by address
    fn get(&self, hash: &Hash) -> Result<Block>;

    /// Check whether an address is present
    fn contains(&self, hash: &Hash) -> bool;
}

/// Store handle carried by references
pub type SharedStore = Arc<dyn BlockStore>;

/// Decode stored bytes and check them against the address they were read from
pub(crate) fn verify(hash: &Hash, bytes: &[u8]) -> Result<Block> {
    let block = Block::decode(bytes)?;
    let actual = block.hash()?;
    if actual != *hash {
        return Err(crate::Error::Corruption(format!(
            "Block {} hashes to {}",
            hash.short(),
            actual.short()
        )));
    }
    Ok(block)
}
