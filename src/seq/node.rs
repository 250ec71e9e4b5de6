//! 2-3 tree nodes and the positional algorithms over them

use crate::persist::{Record, Reference, CHILD_LINKS};
use crate::store::{Block, BlockKind, SharedStore};
use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An interior node with exactly `N` children
#[derive(Clone, Debug)]
pub(crate) struct Branch<const N: usize> {
    pub(crate) children: [Tree; N],
    count: u64,
}

impl<const N: usize> Branch<N> {
    fn new(children: [Tree; N]) -> Self {
        let count = children.iter().map(Tree::count).sum();
        Branch { children, count }
    }
}

/// A persisted subtree that has not been read yet
#[derive(Clone, Debug)]
pub(crate) struct SeqRef {
    pub(crate) reference: Reference,
    /// Element count, known from the link that pointed here
    pub(crate) count: u64,
}

/// A 2-3 tree. Every leaf sits at the same depth.
#[derive(Clone, Debug)]
pub(crate) enum Tree {
    Leaf(Bytes),
    Node2(Arc<Branch<2>>),
    Node3(Arc<Branch<3>>),
    Ref(SeqRef),
}

/// Outcome of removing below a node
pub(crate) enum Removed {
    /// The node was the removed leaf
    Gone,
    /// The subtree kept its height
    Replaced(Tree),
    /// The subtree is one level shorter than its siblings
    Underflow(Tree),
}

/// Pick the child holding position `i` for reads and removals
fn route(children: &[Tree], mut i: u64) -> (usize, u64) {
    let mut idx = 0;
    while idx + 1 < children.len() && i >= children[idx].count() {
        i -= children[idx].count();
        idx += 1;
    }
    (idx, i)
}

/// Pick the child to insert into so the new element lands before position
/// `i`. An index equal to a child's count stays in that child (append).
fn route_insert(children: &[Tree], mut i: u64) -> (usize, u64) {
    let mut idx = 0;
    while idx + 1 < children.len() && i > children[idx].count() {
        i -= children[idx].count();
        idx += 1;
    }
    (idx, i)
}

fn unbalanced() -> Error {
    Error::Corruption("sequence tree leaves are not at equal depth".into())
}

impl Tree {
    pub(crate) fn node2(children: [Tree; 2]) -> Tree {
        Tree::Node2(Arc::new(Branch::new(children)))
    }

    pub(crate) fn node3(children: [Tree; 3]) -> Tree {
        Tree::Node3(Arc::new(Branch::new(children)))
    }

    pub(crate) fn count(&self) -> u64 {
        match self {
            Tree::Leaf(_) => 1,
            Tree::Node2(n) => n.count,
            Tree::Node3(n) => n.count,
            Tree::Ref(r) => r.count,
        }
    }

    /// This node with a top-level reference read from the store
    pub(crate) fn materialize(&self) -> Result<Tree> {
        match self {
            Tree::Ref(r) => r.reference.read::<Tree>(),
            _ => Ok(self.clone()),
        }
    }

    /// Replace a top-level reference in place. On failure the reference
    /// stays where it was.
    fn materialize_in_place(&mut self) -> Result<()> {
        if let Tree::Ref(r) = self {
            let resolved = r.reference.read::<Tree>()?;
            *self = resolved;
        }
        Ok(())
    }

    /// Read position `i` without touching this tree
    pub(crate) fn get_at(&self, i: u64) -> Result<Bytes> {
        let mut node = self.materialize()?;
        let mut i = i;
        loop {
            let (next, rest) = match &node {
                Tree::Leaf(bytes) => return Ok(bytes.clone()),
                Tree::Node2(n) => {
                    let (idx, rest) = route(&n.children, i);
                    (n.children[idx].materialize()?, rest)
                }
                Tree::Node3(n) => {
                    let (idx, rest) = route(&n.children, i);
                    (n.children[idx].materialize()?, rest)
                }
                Tree::Ref(_) => unreachable!("materialize() never returns a reference"),
            };
            node = next;
            i = rest;
        }
    }

    /// Read position `i`, leaving every node on the path materialized
    pub(crate) fn get_at_cached(&mut self, i: u64) -> Result<Bytes> {
        self.materialize_in_place()?;
        match self {
            Tree::Leaf(bytes) => Ok(bytes.clone()),
            Tree::Node2(n) => {
                let (idx, rest) = route(&n.children, i);
                Arc::make_mut(n).children[idx].get_at_cached(rest)
            }
            Tree::Node3(n) => {
                let (idx, rest) = route(&n.children, i);
                Arc::make_mut(n).children[idx].get_at_cached(rest)
            }
            Tree::Ref(_) => unreachable!("reference was just materialized"),
        }
    }

    /// Insert `leaf` before position `i`. The second tree, if any, is an
    /// overflow sibling the caller must place right after the first.
    pub(crate) fn insert_at(&self, i: u64, leaf: Tree) -> Result<(Tree, Option<Tree>)> {
        match self.materialize()? {
            old @ Tree::Leaf(_) => {
                if i == 0 {
                    Ok((leaf, Some(old)))
                } else {
                    Ok((old, Some(leaf)))
                }
            }
            Tree::Node2(n) => {
                let (idx, rest) = route_insert(&n.children, i);
                let (child, extra) = n.children[idx].insert_at(rest, leaf)?;
                let [a, b] = n.children.clone();

                let node = match (idx, extra) {
                    (0, None) => Tree::node2([child, b]),
                    (_, None) => Tree::node2([a, child]),
                    // A 2-node absorbs the overflow
                    (0, Some(extra)) => Tree::node3([child, extra, b]),
                    (_, Some(extra)) => Tree::node3([a, child, extra]),
                };
                Ok((node, None))
            }
            Tree::Node3(n) => {
                let (idx, rest) = route_insert(&n.children, i);
                let (child, extra) = n.children[idx].insert_at(rest, leaf)?;

                match extra {
                    None => {
                        let mut children = n.children.clone();
                        children[idx] = child;
                        Ok((Tree::node3(children), None))
                    }
                    Some(extra) => {
                        // Four children: split into two 2-nodes, hand the
                        // right one up
                        let [a, b, c] = n.children.clone();
                        let (left, right) = match idx {
                            0 => ([child, extra], [b, c]),
                            1 => ([a, child], [extra, c]),
                            _ => ([a, b], [child, extra]),
                        };
                        Ok((Tree::node2(left), Some(Tree::node2(right))))
                    }
                }
            }
            Tree::Ref(_) => unreachable!("materialize() never returns a reference"),
        }
    }

    /// Remove position `i`
    pub(crate) fn remove_at(&self, i: u64) -> Result<Removed> {
        match self.materialize()? {
            Tree::Leaf(_) => Ok(Removed::Gone),
            Tree::Node2(n) => {
                let (idx, rest) = route(&n.children, i);
                let sib = 1 - idx;

                match n.children[idx].remove_at(rest)? {
                    // Short one child: collapse into the survivor
                    Removed::Gone => Ok(Removed::Underflow(n.children[sib].clone())),
                    Removed::Replaced(child) => {
                        let mut children = n.children.clone();
                        children[idx] = child;
                        Ok(Removed::Replaced(Tree::node2(children)))
                    }
                    Removed::Underflow(short) => match n.children[sib].materialize()? {
                        Tree::Node3(s) => {
                            // Steal the nearest grandchild from the 3-node
                            let [s0, s1, s2] = s.children.clone();
                            let children = if sib > idx {
                                [Tree::node2([short, s0]), Tree::node2([s1, s2])]
                            } else {
                                [Tree::node2([s0, s1]), Tree::node2([s2, short])]
                            };
                            Ok(Removed::Replaced(Tree::node2(children)))
                        }
                        Tree::Node2(s) => {
                            // Merge into one 3-node; still one level short
                            let [s0, s1] = s.children.clone();
                            let merged = if sib > idx {
                                Tree::node3([short, s0, s1])
                            } else {
                                Tree::node3([s0, s1, short])
                            };
                            Ok(Removed::Underflow(merged))
                        }
                        _ => Err(unbalanced()),
                    },
                }
            }
            Tree::Node3(n) => {
                let (idx, rest) = route(&n.children, i);

                match n.children[idx].remove_at(rest)? {
                    Removed::Gone => {
                        let [a, b, c] = n.children.clone();
                        let children = match idx {
                            0 => [b, c],
                            1 => [a, c],
                            _ => [a, b],
                        };
                        Ok(Removed::Replaced(Tree::node2(children)))
                    }
                    Removed::Replaced(child) => {
                        let mut children = n.children.clone();
                        children[idx] = child;
                        Ok(Removed::Replaced(Tree::node3(children)))
                    }
                    Removed::Underflow(short) => {
                        let sib = if idx == 0 { 1 } else { idx - 1 };

                        match n.children[sib].materialize()? {
                            Tree::Node3(s) => {
                                let [s0, s1, s2] = s.children.clone();
                                let mut children = n.children.clone();
                                if sib > idx {
                                    children[idx] = Tree::node2([short, s0]);
                                    children[sib] = Tree::node2([s1, s2]);
                                } else {
                                    children[sib] = Tree::node2([s0, s1]);
                                    children[idx] = Tree::node2([s2, short]);
                                }
                                Ok(Removed::Replaced(Tree::node3(children)))
                            }
                            Tree::Node2(s) => {
                                // Merge with the 2-node sibling, shrink to a 2-node
                                let [s0, s1] = s.children.clone();
                                let [a, _, c] = n.children.clone();
                                let children = match idx {
                                    0 => [Tree::node3([short, s0, s1]), c],
                                    1 => [Tree::node3([s0, s1, short]), c],
                                    _ => [a, Tree::node3([s0, s1, short])],
                                };
                                Ok(Removed::Replaced(Tree::node2(children)))
                            }
                            _ => Err(unbalanced()),
                        }
                    }
                }
            }
            Tree::Ref(_) => unreachable!("materialize() never returns a reference"),
        }
    }

    /// Write this subtree (children first) and return a reference to it.
    /// References are returned as-is.
    pub(crate) fn persist(&self, store: &SharedStore) -> Result<SeqRef> {
        match self {
            Tree::Ref(r) => Ok(r.clone()),
            _ => Ok(SeqRef {
                reference: Reference::write(self, store)?,
                count: self.count(),
            }),
        }
    }

    /// Number of interior nodes resident in memory
    pub(crate) fn materialized_nodes(&self) -> usize {
        match self {
            Tree::Leaf(_) | Tree::Ref(_) => 0,
            Tree::Node2(n) => 1 + n.children.iter().map(Tree::materialized_nodes).sum::<usize>(),
            Tree::Node3(n) => 1 + n.children.iter().map(Tree::materialized_nodes).sum::<usize>(),
        }
    }

    /// Depth of every leaf, left to right. Reads through references without
    /// caching them.
    pub(crate) fn leaf_depths(&self, depth: usize, out: &mut Vec<usize>) -> Result<()> {
        match self.materialize()? {
            Tree::Leaf(_) => out.push(depth),
            Tree::Node2(n) => {
                for child in &n.children {
                    child.leaf_depths(depth + 1, out)?;
                }
            }
            Tree::Node3(n) => {
                for child in &n.children {
                    child.leaf_depths(depth + 1, out)?;
                }
            }
            Tree::Ref(_) => unreachable!("materialize() never returns a reference"),
        }
        Ok(())
    }

    pub(crate) fn children(&self) -> &[Tree] {
        match self {
            Tree::Node2(n) => &n.children,
            Tree::Node3(n) => &n.children,
            Tree::Leaf(_) | Tree::Ref(_) => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum SeqTag {
    Leaf,
    Node2,
    Node3,
}

/// Payload of a sequence block
#[derive(Debug, Serialize, Deserialize)]
struct SeqRecord {
    tag: SeqTag,
    count: u64,
    data: Vec<u8>,
}

impl Record for Tree {
    const KIND: BlockKind = BlockKind::SeqNode;

    fn to_block(&self, store: &SharedStore) -> Result<Block> {
        let (tag, data) = match self {
            Tree::Leaf(bytes) => (SeqTag::Leaf, bytes.to_vec()),
            Tree::Node2(_) => (SeqTag::Node2, Vec::new()),
            Tree::Node3(_) => (SeqTag::Node3, Vec::new()),
            Tree::Ref(_) => unreachable!("references are already persisted"),
        };

        let record = SeqRecord {
            tag,
            count: self.count(),
            data,
        };
        let mut block = Block::new(Self::KIND, bincode::serialize(&record)?);

        for (name, child) in CHILD_LINKS.iter().zip(self.children()) {
            let r = child.persist(store)?;
            block = block.with_link(*name, r.reference.hash(), r.count);
        }

        Ok(block)
    }

    fn from_block(block: &Block, store: &SharedStore) -> Result<Self> {
        let record: SeqRecord = bincode::deserialize(&block.data)?;

        let child = |name: &str| -> Result<Tree> {
            let link = block.link(name)?;
            Ok(Tree::Ref(SeqRef {
                reference: Reference::new(link.hash, store.clone()),
                count: link.size,
            }))
        };

        let tree = match record.tag {
            SeqTag::Leaf => Tree::Leaf(Bytes::from(record.data)),
            SeqTag::Node2 => Tree::node2([child("0")?, child("1")?]),
            SeqTag::Node3 => Tree::node3([child("0")?, child("1")?, child("2")?]),
        };

        if tree.count() != record.count {
            return Err(Error::Corruption(format!(
                "sequence node claims {} elements, links hold {}",
                record.count,
                tree.count()
            )));
        }

        Ok(tree)
    }
}
