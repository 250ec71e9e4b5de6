//! Public set API

use super::find::Find;
use super::node::{Removal, SetLeaf, SetTree};
use crate::filter::Filter;
use crate::persist::Reference;
use crate::store::{Hash, SharedStore};
use crate::value::Value;
use crate::Result;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// An immutable approximate set of `V`, searchable by filter
pub struct BloomSet<V> {
    root: Option<SetTree>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for BloomSet<V> {
    fn clone(&self) -> Self {
        BloomSet {
            root: self.root.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> Default for BloomSet<V> {
    fn default() -> Self {
        BloomSet {
            root: None,
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for BloomSet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomSet").field("root", &self.root).finish()
    }
}

impl<V: Value> BloomSet<V> {
    pub fn new() -> Self {
        BloomSet::default()
    }

    fn with_root(root: Option<SetTree>) -> Self {
        BloomSet {
            root,
            _value: PhantomData,
        }
    }

    /// Open a persisted set. Only the root node is read.
    pub fn load(hash: Hash, store: SharedStore) -> Result<Self> {
        if hash.is_zero() {
            return Ok(BloomSet::new());
        }
        let root = Reference::new(hash, store).read::<SetTree>()?;
        tracing::debug!(hash = %hash.short(), len = root.len(), "loaded set");
        Ok(BloomSet::with_root(Some(root)))
    }

    /// Number of stored values
    pub fn len(&self) -> u64 {
        self.root.as_ref().map_or(0, SetTree::len)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Add `value`. Inserting a payload that is already present returns an
    /// equal set.
    pub fn insert(&self, value: &V) -> Result<Self> {
        let leaf = Arc::new(SetLeaf::from_value(value));
        let root = match &self.root {
            Some(root) => root.insert(&leaf)?,
            None => SetTree::Leaf(leaf),
        };
        Ok(BloomSet::with_root(Some(root)))
    }

    /// Remove `value` if present
    pub fn remove(&self, value: &V) -> Result<Self> {
        let leaf = SetLeaf::from_value(value);
        let root = match &self.root {
            Some(root) => match root.remove(&leaf)? {
                Removal::NotFound => return Ok(self.clone()),
                Removal::Gone => None,
                Removal::Replaced(tree) => Some(tree),
            },
            None => None,
        };
        Ok(BloomSet::with_root(root))
    }

    /// Values whose filter may contain `query`
    pub fn find(&self, query: &Filter) -> Find<'static, V> {
        Find::new(self.root.clone(), query.clone())
    }

    /// Write every node not yet in `store` and return the root address.
    /// The empty set is [`Hash::ZERO`] and writes nothing.
    pub fn persist(&self, store: &SharedStore) -> Result<Hash> {
        match &self.root {
            Some(root) => {
                let r = root.persist(store)?;
                tracing::debug!(hash = %r.reference.hash().short(), len = r.len, "persisted set");
                Ok(r.reference.hash())
            }
            None => Ok(Hash::ZERO),
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
}

/// A set plus a read-through cache of the nodes it has loaded
pub struct BloomSetHandle<V> {
    set: BloomSet<V>,
}

impl<V> Default for BloomSetHandle<V> {
    fn default() -> Self {
        BloomSetHandle {
            set: BloomSet::default(),
        }
    }
}

impl<V: Value> BloomSetHandle<V> {
    pub fn new(set: BloomSet<V>) -> Self {
        BloomSetHandle { set }
    }

    /// Open a persisted set, see [`BloomSet::load`]
    pub fn load(hash: Hash, store: SharedStore) -> Result<Self> {
        Ok(BloomSetHandle::new(BloomSet::load(hash, store)?))
    }

    pub fn len(&self) -> u64 {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn insert(&mut self, value: &V) -> Result<()> {
        self.set = self.set.insert(value)?;
        Ok(())
    }

    pub fn remove(&mut self, value: &V) -> Result<()> {
        self.set = self.set.remove(value)?;
        Ok(())
    }

    /// Search, keeping every node read along the way once the iterator is
    /// done or dropped
    pub fn find(&mut self, query: &Filter) -> Find<'_, V> {
        match &mut self.set.root {
            Some(root) => Find::caching(root, query.clone()),
            None => Find::new(None, query.clone()),
        }
    }

    /// Persist and swap the in-memory tree for a reference to it
    pub fn persist(&mut self, store: &SharedStore) -> Result<Hash> {
        match &self.set.root {
            Some(root) => {
                let r = root.persist(store)?;
                let hash = r.reference.hash();
                tracing::debug!(hash = %hash.short(), len = r.len, "persisted set");
                self.set.root = Some(SetTree::Ref(r));
                Ok(hash)
            }
            None => Ok(Hash::ZERO),
        }
    }

    /// Number of interior nodes currently held in memory
    pub fn materialized_nodes(&self) -> usize {
        self.set.root.as_ref().map_or(0, SetTree::materialized_nodes)
    }

    pub fn value(&self) -> &BloomSet<V> {
        &self.set
    }

    pub fn into_inner(self) -> BloomSet<V> {
        self.set
    }
}

impl<V: Value> From<BloomSet<V>> for BloomSetHandle<V> {
    fn from(set: BloomSet<V>) -> Self {
        BloomSetHandle::new(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::value::{count_filter, word_filter, FilterShape, Text};
    use crate::Error;

    fn build(texts: &[&str]) -> BloomSet<Text> {
        let mut set = BloomSet::new();
        for text in texts {
            set = set.insert(&Text::new(*text)).unwrap();
        }
        set
    }

    fn found<'a>(find: Find<'a, Text>) -> Vec<String> {
        let mut values: Vec<String> = find.map(|v| v.unwrap().content).collect();
        values.sort();
        values
    }

    fn memory() -> (Arc<MemoryStore>, SharedStore) {
        let memory = Arc::new(MemoryStore::new());
        let store: SharedStore = memory.clone();
        (memory, store)
    }

    const LANGUAGES: [&str; 12] = [
        "one",
        "one two",
        "one two three",
        "one two three four",
        "ett",
        "ett två",
        "ett två tre",
        "ett två tre fyra",
        "eins",
        "eins zwei",
        "eins zwei drei",
        "eins zwei drei vier",
    ];

    #[test]
    fn test_singleton() {
        let set = build(&["wonk"]);
        assert_eq!(found(set.find(&Text::new("wonk").filter())), vec!["wonk"]);
        assert!(found(set.find(&Text::new("donk").filter())).is_empty());
    }

    #[test]
    fn test_empty_set_finds_nothing() {
        let set = BloomSet::<Text>::new();
        assert!(set.find(&word_filter("anything")).next().is_none());
        assert_eq!(set.len(), 0);
        assert!(set.leaf_depths().unwrap().is_empty());
    }

    #[test]
    fn test_find_single_word() {
        let set = build(&["one", "one two", "one two three", "one two three four"]);
        assert_eq!(found(set.find(&word_filter("four"))), vec!["one two three four"]);
    }

    #[test]
    fn test_queries() {
        let set = build(&LANGUAGES);
        assert_eq!(set.len(), 12);

        assert_eq!(found(set.find(&word_filter("four"))), vec!["one two three four"]);
        assert_eq!(
            found(set.find(&word_filter("två"))),
            vec!["ett två", "ett två tre", "ett två tre fyra"]
        );
        assert_eq!(found(set.find(&word_filter("eins"))).len(), 4);
        assert_eq!(
            found(set.find(&count_filter(3))),
            vec!["eins zwei drei", "ett två tre", "one two three"]
        );
    }

    #[test]
    fn test_duplicate_insert() {
        let set = build(&["a b", "c d"]);
        let again = set.insert(&Text::new("a b")).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(found(again.find(&word_filter("a"))), vec!["a b"]);
    }

    #[test]
    fn test_reinsert_after_reload_adds_nothing() {
        let (_, store) = memory();
        let texts: Vec<Text> = (0..300)
            .map(|i| Text::new(format!("w{} x{} y{}", i % 17, i % 5, i)))
            .collect();
        let mut set = BloomSet::new();
        for text in &texts {
            set = set.insert(text).unwrap();
        }
        let hash = set.persist(&store).unwrap();

        let mut handle = BloomSetHandle::<Text>::load(hash, store.clone()).unwrap();
        for text in &texts {
            handle.insert(text).unwrap();
        }
        assert_eq!(handle.len(), 300);
        assert_eq!(handle.value().leaf_depths().unwrap().len(), 300);
        assert_eq!(handle.persist(&store).unwrap(), hash);
    }

    #[test]
    fn test_found_values_keep_configured_geometry() {
        let shape = FilterShape {
            bytes: 64,
            hashes: 4,
        };
        let mut set = BloomSet::new();
        for text in ["alpha beta", "gamma delta", "epsilon"] {
            set = set.insert(&Text::with_shape(text, shape)).unwrap();
        }

        let hits: Vec<Text> = set
            .find(&shape.word_filter("gamma"))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(hits, vec![Text::with_shape("gamma delta", shape)]);

        // Found values can be fed straight back into the set
        assert_eq!(set.insert(&hits[0]).unwrap().len(), 3);
        let set = set.remove(&hits[0]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.find(&shape.word_filter("gamma")).count(), 0);
    }

    #[test]
    fn test_reasonable_balance() {
        let mut set = BloomSet::new();
        for i in 0..1000 {
            set = set.insert(&Text::new(format!("element #{}", i))).unwrap();
        }
        assert_eq!(set.len(), 1000);

        let depths = set.leaf_depths().unwrap();
        let max = depths.iter().copied().max().unwrap();
        let min = depths.iter().copied().min().unwrap();
        assert!(max - min <= min / 2, "depths range from {} to {}", min, max);
    }

    #[test]
    fn test_haystack() {
        let mut set = BloomSet::new();
        for i in 0..10_000 {
            set = set.insert(&Text::new(format!("haystrand #{}", i))).unwrap();
        }
        set = set.insert(&Text::new("needle")).unwrap();

        let first = set.find(&word_filter("needle")).next().unwrap().unwrap();
        assert_eq!(first.content, "needle");
    }

    #[test]
    fn test_remove_then_find() {
        let mut set = build(&LANGUAGES);
        let gone = Text::new("ett två tre");
        set = set.remove(&gone).unwrap();

        assert_eq!(set.len(), 11);
        assert!(!found(set.find(&gone.filter())).contains(&gone.content));
        assert_eq!(
            found(set.find(&word_filter("två"))),
            vec!["ett två", "ett två tre fyra"]
        );
        assert_eq!(found(set.find(&word_filter("eins"))).len(), 4);
        assert_eq!(set.leaf_depths().unwrap().len(), 11);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let set = build(&["x", "y z"]);
        let same = set.remove(&Text::new("not here")).unwrap();
        assert_eq!(same.len(), 2);

        let empty = BloomSet::<Text>::new().remove(&Text::new("x")).unwrap();
        assert!(empty.is_empty());

        let last = build(&["only"]).remove(&Text::new("only")).unwrap();
        assert!(last.is_empty());
    }

    #[test]
    fn test_remove_everything() {
        let mut set = build(&LANGUAGES);
        for text in LANGUAGES {
            set = set.remove(&Text::new(text)).unwrap();
        }
        assert!(set.is_empty());
    }

    #[test]
    fn test_persist_and_load() {
        let (_, store) = memory();
        let set = build(&LANGUAGES);
        let hash = set.persist(&store).unwrap();

        let loaded = BloomSet::<Text>::load(hash, store.clone()).unwrap();
        assert_eq!(loaded.len(), 12);
        assert_eq!(found(loaded.find(&word_filter("fyra"))), vec!["ett två tre fyra"]);
        assert_eq!(loaded.leaf_depths().unwrap(), set.leaf_depths().unwrap());

        let edited = loaded.insert(&Text::new("one more")).unwrap();
        assert_eq!(found(edited.find(&word_filter("more"))), vec!["one more"]);

        assert_eq!(BloomSet::<Text>::new().persist(&store).unwrap(), Hash::ZERO);
        assert!(BloomSet::<Text>::load(Hash::ZERO, store).unwrap().is_empty());
    }

    #[test]
    fn test_persist_is_idempotent() {
        let (memory, store) = memory();
        let mut handle = BloomSetHandle::new(build(&LANGUAGES));

        let first = handle.persist(&store).unwrap();
        let written = memory.writes();
        assert_eq!(handle.persist(&store).unwrap(), first);
        assert_eq!(memory.writes(), written);
    }

    #[test]
    fn test_handle_find_caches_visited_nodes() {
        let (_, store) = memory();
        let mut set = BloomSet::new();
        for i in 0..100 {
            set = set.insert(&Text::new(format!("element #{}", i))).unwrap();
        }
        set = set.insert(&Text::new("needle")).unwrap();

        let mut handle = BloomSetHandle::new(set);
        handle.persist(&store).unwrap();
        assert_eq!(handle.materialized_nodes(), 0);

        assert_eq!(found(handle.find(&word_filter("needle"))), vec!["needle"]);
        let cached = handle.materialized_nodes();
        assert!(cached > 0);
        assert!(cached < 50, "pruned search read {} of 100 nodes", cached);

        // A second search over the same path reads nothing new
        assert_eq!(found(handle.find(&word_filter("needle"))), vec!["needle"]);
        assert_eq!(handle.materialized_nodes(), cached);
    }

    #[test]
    fn test_dropped_find_keeps_partial_cache() {
        let (_, store) = memory();
        let mut handle = BloomSetHandle::new(build(&LANGUAGES));
        handle.persist(&store).unwrap();

        let first = handle.find(&word_filter("eins")).next();
        assert!(matches!(first, Some(Ok(_))));
        assert!(handle.materialized_nodes() > 0);
        assert_eq!(handle.len(), 12);
    }

    #[test]
    fn test_find_reports_missing_blocks() {
        let (memory, store) = memory();
        let set = build(&LANGUAGES);
        let hash = set.persist(&store).unwrap();
        let loaded = BloomSet::<Text>::load(hash, store.clone()).unwrap();

        let leaf = SetTree::Leaf(Arc::new(SetLeaf::from_value(&Text::new("eins"))));
        let leaf = leaf.persist(&store).unwrap();
        assert!(memory.evict(&leaf.reference.hash()));

        let results: Vec<_> = loaded.find(&word_filter("eins")).collect();
        assert_eq!(results.len(), 4);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(Error::NotFound(_))))
                .count(),
            1
        );
    }
}
