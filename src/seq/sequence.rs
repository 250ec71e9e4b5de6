//! Public sequence API

use super::node::{Removed, SeqRef, Tree};
use crate::persist::Reference;
use crate::store::{Hash, SharedStore};
use crate::{Error, Result};
use bytes::Bytes;

/// An immutable ordered sequence of byte payloads
///
/// Every mutation returns a new sequence; the receiver is left untouched.
/// Nodes not on the mutated path are shared between versions.
#[derive(Clone, Debug, Default)]
pub struct Sequence {
    root: Option<Tree>,
}

impl Sequence {
    pub fn new() -> Self {
        Sequence::default()
    }

    /// Open a persisted sequence. The root is read immediately to learn the
    /// element count; everything below it stays in the store until needed.
    pub fn load(hash: Hash, store: SharedStore) -> Result<Self> {
        if hash.is_zero() {
            return Ok(Sequence::new());
        }
        let root = Reference::new(hash, store).read::<Tree>()?;
        tracing::debug!(hash = %hash.short(), count = root.count(), "loaded sequence");
        Ok(Sequence { root: Some(root) })
    }

    pub fn count(&self) -> u64 {
        self.root.as_ref().map_or(0, Tree::count)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn check(&self, index: u64, limit: u64) -> Result<()> {
        if index >= limit {
            return Err(Error::OutOfBounds {
                index,
                count: self.count(),
            });
        }
        Ok(())
    }

    /// Payload at `index`
    pub fn get_at(&self, index: u64) -> Result<Bytes> {
        self.check(index, self.count())?;
        match &self.root {
            Some(root) => root.get_at(index),
            None => unreachable!("bounds check rejects every index of an empty sequence"),
        }
    }

    /// Insert `payload` before `index`. `index == count()` appends.
    pub fn insert_at(&self, index: u64, payload: impl Into<Bytes>) -> Result<Sequence> {
        self.check(index, self.count() + 1)?;
        let leaf = Tree::Leaf(payload.into());

        let root = match &self.root {
            None => leaf,
            Some(root) => match root.insert_at(index, leaf)? {
                (tree, None) => tree,
                // Overflow at the root: grow by one level
                (tree, Some(extra)) => Tree::node2([tree, extra]),
            },
        };
        Ok(Sequence { root: Some(root) })
    }

    pub fn push(&self, payload: impl Into<Bytes>) -> Result<Sequence> {
        self.insert_at(self.count(), payload)
    }

    /// Remove the element at `index`
    pub fn remove_at(&self, index: u64) -> Result<Sequence> {
        self.check(index, self.count())?;
        let root = match &self.root {
            Some(root) => match root.remove_at(index)? {
                Removed::Gone => None,
                Removed::Replaced(tree) | Removed::Underflow(tree) => Some(tree),
            },
            None => unreachable!("bounds check rejects every index of an empty sequence"),
        };
        Ok(Sequence { root })
    }

    /// Write every node not yet in `store` and return the root address.
    /// The empty sequence is [`Hash::ZERO`] and writes nothing.
    pub fn persist(&self, store: &SharedStore) -> Result<Hash> {
        Ok(self.persist_root(store)?.map_or(Hash::ZERO, |r| r.reference.hash()))
    }

    fn persist_root(&self, store: &SharedStore) -> Result<Option<SeqRef>> {
        let root = match &self.root {
            Some(root) => root.persist(store)?,
            None => return Ok(None),
        };
        tracing::debug!(hash = %root.reference.hash().short(), count = root.count, "persisted sequence");
        Ok(Some(root))
    }

    /// All payloads in order, reading persisted nodes as they are reached
    pub fn iter(&self) -> Iter {
        Iter {
            stack: self.root.iter().cloned().collect(),
        }
    }

    /// Depth of each leaf, left to right
    pub fn leaf_depths(&self) -> Result<Vec<usize>> {
        let mut depths = Vec::new();
        if let Some(root) = &self.root {
            root.leaf_depths(0, &mut depths)?;
        }
        Ok(depths)
    }

    /// Whether every leaf sits at the same depth
    pub fn is_balanced(&self) -> Result<bool> {
        let depths = self.leaf_depths()?;
        Ok(depths.windows(2).all(|w| w[0] == w[1]))
    }
}

impl<B: Into<Bytes>> FromIterator<B> for Sequence {
    /// Build a balanced tree bottom-up, grouping each level into 3-nodes and
    /// finishing with 2-nodes so no node is left with a single child.
    fn from_iter<I: IntoIterator<Item = B>>(iter: I) -> Self {
        let mut level: Vec<Tree> = iter.into_iter().map(|b| Tree::Leaf(b.into())).collect();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len() / 2 + 1);
            let mut i = 0;
            while i < level.len() {
                let left = level.len() - i;
                if left == 2 || left == 4 {
                    next.push(Tree::node2([level[i].clone(), level[i + 1].clone()]));
                    i += 2;
                } else {
                    next.push(Tree::node3([
                        level[i].clone(),
                        level[i + 1].clone(),
                        level[i + 2].clone(),
                    ]));
                    i += 3;
                }
            }
            level = next;
        }

        Sequence { root: level.pop() }
    }
}

/// In-order iterator over a sequence's payloads
///
/// Stops after the first store error.
pub struct Iter {
    stack: Vec<Tree>,
}

impl Iterator for Iter {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            let node = match node.materialize() {
                Ok(node) => node,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            };
            match node {
                Tree::Leaf(bytes) => return Some(Ok(bytes)),
                branch => self.stack.extend(branch.children().iter().rev().cloned()),
            }
        }
        None
    }
}

/// A sequence plus a read-through cache of the nodes it has loaded
///
/// Reads through a handle replace references with the nodes they resolve
/// to, inside this handle only. Mutations go through the same cache.
#[derive(Clone, Debug, Default)]
pub struct SequenceHandle {
    seq: Sequence,
}

impl SequenceHandle {
    pub fn new(seq: Sequence) -> Self {
        SequenceHandle { seq }
    }

    /// Open a persisted sequence, see [`Sequence::load`]
    pub fn load(hash: Hash, store: SharedStore) -> Result<Self> {
        Ok(SequenceHandle::new(Sequence::load(hash, store)?))
    }

    pub fn count(&self) -> u64 {
        self.seq.count()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Payload at `index`, caching every node read on the way
    ///
    /// If a node cannot be read the reference to it stays in place and the
    /// error is returned; a later call retries.
    pub fn get_at(&mut self, index: u64) -> Result<Bytes> {
        self.seq.check(index, self.seq.count())?;
        match &mut self.seq.root {
            Some(root) => root.get_at_cached(index),
            None => unreachable!("bounds check rejects every index of an empty sequence"),
        }
    }

    pub fn insert_at(&mut self, index: u64, payload: impl Into<Bytes>) -> Result<()> {
        self.seq = self.seq.insert_at(index, payload)?;
        Ok(())
    }

    pub fn push(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.seq = self.seq.push(payload)?;
        Ok(())
    }

    pub fn remove_at(&mut self, index: u64) -> Result<()> {
        self.seq = self.seq.remove_at(index)?;
        Ok(())
    }

    /// Persist and swap the in-memory tree for a reference to it
    pub fn persist(&mut self, store: &SharedStore) -> Result<Hash> {
        match self.seq.persist_root(store)? {
            Some(root) => {
                let hash = root.reference.hash();
                self.seq.root = Some(Tree::Ref(root));
                Ok(hash)
            }
            None => Ok(Hash::ZERO),
        }
    }

    /// Number of interior nodes currently held in memory
    pub fn materialized_nodes(&self) -> usize {
        self.seq.root.as_ref().map_or(0, Tree::materialized_nodes)
    }

    pub fn value(&self) -> &Sequence {
        &self.seq
    }

    pub fn into_inner(self) -> Sequence {
        self.seq
    }
}

impl From<Sequence> for SequenceHandle {
    fn from(seq: Sequence) -> Self {
        SequenceHandle::new(seq)
    }
}
