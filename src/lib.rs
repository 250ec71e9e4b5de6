//! # bloomtree
//!
//! Persistent trees over a content-addressed block store.
//!
//! bloomtree provides two immutable, structurally shared collections whose
//! subtrees can be flushed to a [`BlockStore`] and read back lazily, one node
//! at a time, when they are next touched.
//!
//! ## Core Concepts
//!
//! - **Sequences**: positional lists kept as balanced 2-3 trees
//! - **Bloom sets**: approximate sets clustered by bloom filter similarity,
//!   searchable by filter
//! - **References**: content addresses standing in for subtrees that have not
//!   been read yet
//! - **Handles**: owners of a tree that keep the nodes they read
//!
//! ## Example
//!
//! ```ignore
//! use bloomtree::{MemoryStore, Sequence, SequenceHandle, SharedStore};
//! use std::sync::Arc;
//!
//! let store: SharedStore = Arc::new(MemoryStore::new());
//! let seq: Sequence = ["a", "b", "c"].into_iter().collect();
//! let root = seq.persist(&store)?;
//!
//! let mut handle = SequenceHandle::load(root, store)?;
//! assert_eq!(handle.get_at(1)?, "b");
//! ```

pub mod config;
pub mod filter;
pub mod seq;
pub mod set;
pub mod store;
pub mod value;

mod error;
mod persist;

pub use config::Config;
pub use error::{Error, Result};
pub use filter::{BloomFilter, Filter};
pub use persist::Reference;
pub use seq::{Sequence, SequenceHandle};
pub use set::{BloomSet, BloomSetHandle, Find};
pub use store::{Block, BlockKind, BlockStore, FileStore, Hash, MemoryStore, SharedStore};
pub use value::{count_filter, word_filter, FilterShape, Text, Value};

/// Store file format version
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"BLOOMTRE";
