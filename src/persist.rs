//! Lazy persistence shared by both tree engines
//!
//! Nodes are written bottom-up: a node's children are persisted first and
//! attached to its block as named links, so every block only ever points at
//! blocks that already exist. Reading is the reverse and one level at a
//! time: [`Reference::read`] rebuilds a single node whose children are again
//! references, and the engines swap the materialized node into the tree
//! they are walking.

use crate::store::{Block, BlockKind, Hash, SharedStore};
use crate::Result;
use std::fmt;

/// A tree node that can round-trip through a block
pub(crate) trait Record: Sized {
    const KIND: BlockKind;

    /// Encode this node. Children are persisted first and linked, never
    /// inlined.
    fn to_block(&self, store: &SharedStore) -> Result<Block>;

    /// Rebuild one level of structure; children come back as references.
    fn from_block(block: &Block, store: &SharedStore) -> Result<Self>;
}

/// Address of a persisted subtree plus the store it lives in
#[derive(Clone)]
pub struct Reference {
    hash: Hash,
    store: SharedStore,
}

impl Reference {
    pub fn new(hash: Hash, store: SharedStore) -> Self {
        Reference { hash, store }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Encode `node` (children first) and store it
    pub(crate) fn write<R: Record>(node: &R, store: &SharedStore) -> Result<Reference> {
        let block = node.to_block(store)?;
        let hash = store.put(&block)?;
        tracing::trace!(hash = %hash.short(), kind = ?R::KIND, links = block.links.len(), "persisted node");
        Ok(Reference {
            hash,
            store: store.clone(),
        })
    }

    /// Fetch and decode one level of the referenced subtree
    pub(crate) fn read<R: Record>(&self) -> Result<R> {
        let block = self.store.get(&self.hash)?;
        block.expect_kind(R::KIND)?;
        tracing::trace!(hash = %self.hash.short(), kind = ?R::KIND, "resolved reference");
        R::from_block(&block, &self.store)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self.hash.short())
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Reference {}

/// Link names for children, in order
pub(crate) const CHILD_LINKS: [&str; 3] = ["0", "1", "2"];
