//! Named bloom filters
//!
//! A [`Filter`] maps attribute names (e.g. `"words"`, `"count"`) to bloom
//! filters. Filters are merged and compared name by name, which lets one
//! value describe itself along several independent attributes while a query
//! only mentions the attributes it cares about.

mod bloom;

pub use bloom::BloomFilter;

use crate::{Error, Result};
use std::collections::BTreeMap;

/// A set of bloom filters keyed by attribute name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    entries: BTreeMap<String, BloomFilter>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, filter: BloomFilter) -> Self {
        self.insert(name, filter);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, filter: BloomFilter) {
        self.entries.insert(name.into(), filter);
    }

    pub fn get(&self, name: &str) -> Option<&BloomFilter> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of both filters. Names present on one side only are copied.
    pub fn merge(&self, other: &Filter) -> Result<Filter> {
        let mut merged = self.entries.clone();

        for (name, theirs) in &other.entries {
            let combined = match merged.get(name) {
                Some(ours) => ours.merge(theirs).ok_or_else(|| Error::FilterMismatch {
                    name: name.clone(),
                    left: ours.geometry(),
                    right: theirs.geometry(),
                })?,
                None => theirs.clone(),
            };
            merged.insert(name.clone(), combined);
        }

        Ok(Filter { entries: merged })
    }

    /// Sum of per-name Hamming distances over the names both sides share.
    /// A name missing on either side contributes nothing.
    pub fn hamming_distance(&self, other: &Filter) -> u32 {
        self.entries
            .iter()
            .filter_map(|(name, ours)| {
                other
                    .entries
                    .get(name)
                    .map(|theirs| ours.hamming_distance(theirs))
            })
            .sum()
    }

    /// Conservative containment: every filter named in `smaller` must be
    /// contained in the filter of the same name here.
    ///
    /// A name absent here only passes if the query filter for it has no bits
    /// set.
    pub fn may_contain(&self, smaller: &Filter) -> bool {
        smaller.entries.iter().all(|(name, small)| {
            self.entries
                .get(name)
                .map_or(small.is_empty(), |big| big.may_contain(small))
        })
    }

    /// Serialized form as ordered (name, bytes) pairs
    pub fn to_pairs(&self) -> Vec<(String, Vec<u8>)> {
        self.entries
            .iter()
            .map(|(name, filter)| (name.clone(), filter.to_bytes()))
            .collect()
    }

    /// Inverse of [`Filter::to_pairs`]
    pub fn from_pairs(pairs: Vec<(String, Vec<u8>)>) -> Result<Filter> {
        let mut filter = Filter::new();
        for (name, bytes) in pairs {
            let bloom = BloomFilter::from_bytes(&bytes)
                .ok_or_else(|| Error::Corruption(format!("Malformed bloom filter '{}'", name)))?;
            filter.insert(name, bloom);
        }
        Ok(filter)
    }
}
