//! Hamming tree nodes
//!
//! A strict binary tree whose interior nodes carry the merged filter of
//! everything below them. New leaves descend towards the child whose filter
//! is closest in Hamming distance, so similar values cluster and searches can
//! prune whole subtrees.

use crate::filter::Filter;
use crate::persist::{Record, Reference, CHILD_LINKS};
use crate::store::{Block, BlockKind, SharedStore};
use crate::value::Value;
use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stored value: its payload and the filter it was inserted with
#[derive(Clone, Debug)]
pub(crate) struct SetLeaf {
    pub(crate) bytes: Bytes,
    pub(crate) filter: Filter,
}

impl SetLeaf {
    pub(crate) fn from_value<V: Value>(value: &V) -> Self {
        SetLeaf {
            bytes: Bytes::from(value.to_bytes()),
            filter: value.filter(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SetNode {
    pub(crate) children: [SetTree; 2],
    pub(crate) filter: Filter,
    pub(crate) len: u64,
}

/// A persisted subtree that has not been read yet
#[derive(Clone, Debug)]
pub(crate) struct SetRef {
    pub(crate) reference: Reference,
    /// Leaf count, known from the link that pointed here
    pub(crate) len: u64,
}

#[derive(Clone, Debug)]
pub(crate) enum SetTree {
    Leaf(Arc<SetLeaf>),
    Node(Arc<SetNode>),
    Ref(SetRef),
}

/// Outcome of removing below a node
pub(crate) enum Removal {
    NotFound,
    /// The node was the removed leaf
    Gone,
    Replaced(SetTree),
}

impl SetTree {
    /// Join two materialized subtrees under a new node
    pub(crate) fn node(a: SetTree, b: SetTree) -> Result<SetTree> {
        let filter = a.filter().merge(b.filter())?;
        let len = a.len() + b.len();
        Ok(SetTree::Node(Arc::new(SetNode {
            children: [a, b],
            filter,
            len,
        })))
    }

    pub(crate) fn len(&self) -> u64 {
        match self {
            SetTree::Leaf(_) => 1,
            SetTree::Node(n) => n.len,
            SetTree::Ref(r) => r.len,
        }
    }

    pub(crate) fn is_ref(&self) -> bool {
        matches!(self, SetTree::Ref(_))
    }

    /// Filter of a materialized node
    pub(crate) fn filter(&self) -> &Filter {
        match self {
            SetTree::Leaf(l) => &l.filter,
            SetTree::Node(n) => &n.filter,
            SetTree::Ref(_) => unreachable!("filters are only read from materialized nodes"),
        }
    }

    /// This node with a top-level reference read from the store
    pub(crate) fn materialize(&self) -> Result<SetTree> {
        match self {
            SetTree::Ref(r) => r.reference.read::<SetTree>(),
            _ => Ok(self.clone()),
        }
    }

    fn children(&self) -> Result<[SetTree; 2]> {
        match self {
            SetTree::Node(n) => Ok([n.children[0].materialize()?, n.children[1].materialize()?]),
            _ => unreachable!("only interior nodes have children"),
        }
    }

    /// Add `leaf`, returning the new subtree. A leaf with the same payload
    /// already present anywhere below leaves the tree unchanged.
    pub(crate) fn insert(&self, leaf: &Arc<SetLeaf>) -> Result<SetTree> {
        if self.contains(leaf)? {
            return Ok(self.clone());
        }
        self.descend(leaf)
    }

    /// Whether a leaf with `leaf`'s payload is stored below this node.
    /// Walks the same branches as [`SetTree::remove`].
    pub(crate) fn contains(&self, leaf: &SetLeaf) -> Result<bool> {
        match self.materialize()? {
            SetTree::Leaf(l) => Ok(l.bytes == leaf.bytes),
            this @ SetTree::Node(_) => {
                for child in this.children()? {
                    if child.filter().may_contain(&leaf.filter) && child.contains(leaf)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            SetTree::Ref(_) => unreachable!("materialize() never returns a reference"),
        }
    }

    fn descend(&self, leaf: &Arc<SetLeaf>) -> Result<SetTree> {
        let this = self.materialize()?;
        match &this {
            SetTree::Leaf(_) => SetTree::node(this.clone(), SetTree::Leaf(leaf.clone())),
            SetTree::Node(_) => {
                let [c0, c1] = this.children()?;
                let d0 = c0.filter().hamming_distance(&leaf.filter);
                let d1 = c1.filter().hamming_distance(&leaf.filter);

                // Ties go left on even distance, right on odd
                let left = if d0 == d1 { d0 % 2 == 0 } else { d0 < d1 };
                if left {
                    SetTree::node(c0.descend(leaf)?, c1)
                } else {
                    SetTree::node(c0, c1.descend(leaf)?)
                }
            }
            SetTree::Ref(_) => unreachable!("materialize() never returns a reference"),
        }
    }

    /// Remove the leaf whose payload equals `leaf`'s
    ///
    /// Only children whose filter may contain the leaf are searched, the
    /// second one only if the first did not hold it.
    pub(crate) fn remove(&self, leaf: &SetLeaf) -> Result<Removal> {
        let this = self.materialize()?;
        match &this {
            SetTree::Leaf(l) if l.bytes == leaf.bytes => Ok(Removal::Gone),
            SetTree::Leaf(_) => Ok(Removal::NotFound),
            SetTree::Node(_) => {
                let children = this.children()?;

                for (i, child) in children.iter().enumerate() {
                    if !child.filter().may_contain(&leaf.filter) {
                        continue;
                    }
                    match child.remove(leaf)? {
                        Removal::NotFound => continue,
                        // The sibling takes this node's place
                        Removal::Gone => return Ok(Removal::Replaced(children[1 - i].clone())),
                        Removal::Replaced(tree) => {
                            let [mut c0, mut c1] = children.clone();
                            if i == 0 {
                                c0 = tree;
                            } else {
                                c1 = tree;
                            }
                            return Ok(Removal::Replaced(SetTree::node(c0, c1)?));
                        }
                    }
                }
                Ok(Removal::NotFound)
            }
            SetTree::Ref(_) => unreachable!("materialize() never returns a reference"),
        }
    }

    /// Write this subtree (children first) and return a reference to it
    pub(crate) fn persist(&self, store: &SharedStore) -> Result<SetRef> {
        match self {
            SetTree::Ref(r) => Ok(r.clone()),
            _ => Ok(SetRef {
                reference: Reference::write(self, store)?,
                len: self.len(),
            }),
        }
    }

    pub(crate) fn materialized_nodes(&self) -> usize {
        match self {
            SetTree::Leaf(_) | SetTree::Ref(_) => 0,
            SetTree::Node(n) => 1 + n.children.iter().map(SetTree::materialized_nodes).sum::<usize>(),
        }
    }

    pub(crate) fn leaf_depths(&self, depth: usize, out: &mut Vec<usize>) -> Result<()> {
        match self.materialize()? {
            SetTree::Leaf(_) => out.push(depth),
            SetTree::Node(n) => {
                for child in &n.children {
                    child.leaf_depths(depth + 1, out)?;
                }
            }
            SetTree::Ref(_) => unreachable!("materialize() never returns a reference"),
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum SetTag {
    Leaf,
    Node,
}

/// Payload of a set block
#[derive(Debug, Serialize, Deserialize)]
struct SetRecord {
    tag: SetTag,
    filter: Vec<(String, Vec<u8>)>,
    data: Vec<u8>,
}

impl Record for SetTree {
    const KIND: BlockKind = BlockKind::SetNode;

    fn to_block(&self, store: &SharedStore) -> Result<Block> {
        let record = match self {
            SetTree::Leaf(l) => SetRecord {
                tag: SetTag::Leaf,
                filter: l.filter.to_pairs(),
                data: l.bytes.to_vec(),
            },
            SetTree::Node(n) => SetRecord {
                tag: SetTag::Node,
                filter: n.filter.to_pairs(),
                data: Vec::new(),
            },
            SetTree::Ref(_) => unreachable!("references are already persisted"),
        };
        let mut block = Block::new(Self::KIND, bincode::serialize(&record)?);

        if let SetTree::Node(n) = self {
            for (name, child) in CHILD_LINKS.iter().zip(&n.children) {
                let r = child.persist(store)?;
                block = block.with_link(*name, r.reference.hash(), r.len);
            }
        }

        Ok(block)
    }

    fn from_block(block: &Block, store: &SharedStore) -> Result<Self> {
        let record: SetRecord = bincode::deserialize(&block.data)?;
        let filter = Filter::from_pairs(record.filter)?;

        match record.tag {
            SetTag::Leaf => Ok(SetTree::Leaf(Arc::new(SetLeaf {
                bytes: Bytes::from(record.data),
                filter,
            }))),
            SetTag::Node => {
                let child = |name: &str| -> Result<SetTree> {
                    let link = block.link(name)?;
                    if link.size == 0 {
                        return Err(Error::Corruption(format!(
                            "set child '{}' claims to hold no leaves",
                            name
                        )));
                    }
                    Ok(SetTree::Ref(SetRef {
                        reference: Reference::new(link.hash, store.clone()),
                        len: link.size,
                    }))
                };
                let children = [child("0")?, child("1")?];
                let len = children.iter().map(SetTree::len).sum();
                Ok(SetTree::Node(Arc::new(SetNode {
                    children,
                    filter,
                    len,
                })))
            }
        }
    }
}
