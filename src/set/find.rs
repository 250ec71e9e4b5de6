//! Filtered search over a set tree

use super::node::{SetNode, SetTree};
use crate::filter::Filter;
use crate::value::Value;
use crate::Result;
use std::marker::PhantomData;
use std::sync::Arc;

/// One interior node on the current search path
struct Frame {
    node: Arc<SetNode>,
    children: [SetTree; 2],
    /// Next child to visit
    next: usize,
    /// Whether any child was replaced by the node it resolved to
    changed: bool,
}

impl Frame {
    fn new(node: Arc<SetNode>) -> Self {
        Frame {
            children: node.children.clone(),
            node,
            next: 0,
            changed: false,
        }
    }

    fn into_tree(self) -> SetTree {
        if !self.changed {
            return SetTree::Node(self.node);
        }
        SetTree::Node(Arc::new(SetNode {
            children: self.children,
            filter: self.node.filter.clone(),
            len: self.node.len,
        }))
    }
}

/// Lazy iterator over the values whose filters may contain a query
///
/// Subtrees whose merged filter cannot contain the query are never read.
/// Matches are not re-checked against the query, so a bloom false positive
/// is returned like any other match.
///
/// When created from a [`super::BloomSetHandle`], every node read during the
/// search is stored back into the handle once the iterator is exhausted or
/// dropped.
pub struct Find<'a, V> {
    query: Filter,
    start: Option<SetTree>,
    stack: Vec<Frame>,
    slot: Option<&'a mut SetTree>,
    _value: PhantomData<fn() -> V>,
}

impl<'a, V: Value> Find<'a, V> {
    pub(crate) fn new(root: Option<SetTree>, query: Filter) -> Self {
        Find {
            query,
            start: root,
            stack: Vec::new(),
            slot: None,
            _value: PhantomData,
        }
    }

    /// Search the tree in `slot`, writing resolved nodes back into it
    pub(crate) fn caching(slot: &'a mut SetTree, query: Filter) -> Self {
        Find {
            query,
            start: Some(slot.clone()),
            stack: Vec::new(),
            slot: Some(slot),
            _value: PhantomData,
        }
    }

    /// Visit the root. Its filter is checked like any other node's.
    fn enter(&mut self, root: SetTree) -> Option<Result<V>> {
        let root = match root.materialize() {
            Ok(root) => root,
            Err(e) => return Some(Err(e)),
        };

        if !root.filter().may_contain(&self.query) {
            self.finish(root);
            return None;
        }

        match root {
            SetTree::Leaf(leaf) => {
                let value = V::from_bytes(&leaf.bytes, &leaf.filter);
                self.finish(SetTree::Leaf(leaf));
                Some(value)
            }
            SetTree::Node(node) => {
                self.stack.push(Frame::new(node));
                None
            }
            SetTree::Ref(_) => unreachable!("materialize() never returns a reference"),
        }
    }
}

impl<'a, V> Find<'a, V> {
    /// Close the innermost frame and hand its node to the parent
    fn pop(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let changed = frame.changed;
        let tree = frame.into_tree();

        if let Some(parent) = self.stack.last_mut() {
            parent.children[parent.next - 1] = tree;
            parent.changed |= changed;
            return;
        }
        self.finish(tree);
    }

    fn finish(&mut self, root: SetTree) {
        if let Some(slot) = self.slot.take() {
            tracing::trace!(nodes = root.materialized_nodes(), "search cached nodes");
            *slot = root;
        }
    }
}

impl<'a, V: Value> Iterator for Find<'a, V> {
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.start.take() {
            if let Some(item) = self.enter(root) {
                return Some(item);
            }
        }

        loop {
            let frame = self.stack.last_mut()?;
            if frame.next == frame.children.len() {
                self.pop();
                continue;
            }

            let i = frame.next;
            frame.next += 1;

            let child = match frame.children[i].materialize() {
                Ok(child) => child,
                // The reference stays; the rest of the tree is still searched
                Err(e) => return Some(Err(e)),
            };
            if frame.children[i].is_ref() {
                frame.children[i] = child.clone();
                frame.changed = true;
            }

            if !child.filter().may_contain(&self.query) {
                continue;
            }

            match child {
                SetTree::Leaf(leaf) => return Some(V::from_bytes(&leaf.bytes, &leaf.filter)),
                SetTree::Node(node) => self.stack.push(Frame::new(node)),
                SetTree::Ref(_) => unreachable!("materialize() never returns a reference"),
            }
        }
    }
}

impl<'a, V> Drop for Find<'a, V> {
    fn drop(&mut self) {
        // Fold the open path back into the root
        while !self.stack.is_empty() {
            self.pop();
        }
    }
}
