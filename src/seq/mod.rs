//! Ordered sequences as persistent 2-3 trees
//!
//! Elements are addressed by position. Every interior node caches the number
//! of leaves below it, so `get_at`, `insert_at` and `remove_at` walk a single
//! root-to-leaf path and rebuild only that path, sharing everything else with
//! the previous version.
//!
//! A [`Sequence`] is an immutable value. A [`SequenceHandle`] owns one and
//! caches nodes it reads from the store, so repeated access to a persisted
//! sequence only hits the store once per node.

mod node;
mod sequence;

pub use sequence::{Iter, Sequence, SequenceHandle};
