//! Approximate sets indexed by bloom filters
//!
//! Values are kept in a binary tree clustered by filter similarity. Each
//! interior node holds the union of its children's filters, so a search only
//! descends into subtrees that may contain a match.
//!
//! ```ignore
//! use bloomtree::{word_filter, BloomSet, Text};
//!
//! let set = BloomSet::new()
//!     .insert(&Text::new("one two"))?
//!     .insert(&Text::new("three four"))?;
//! let hits: Vec<Text> = set.find(&word_filter("four")).collect::<Result<_, _>>()?;
//! ```

mod bloom_set;
mod find;
mod node;

pub use bloom_set::{BloomSet, BloomSetHandle};
pub use find::Find;
