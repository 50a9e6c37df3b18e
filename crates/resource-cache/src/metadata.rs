use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

use crate::aliases::KeyTargets;
use crate::error::LoadError;
use crate::key::ResourceAlias;
use crate::pagination::PageInfo;
use crate::use_tracker::UseId;

/// Identifies a metadata entry: either a concrete key or an alias as requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetaKey<K> {
    Key(K),
    Alias(ResourceAlias<K>),
}

/// Bookkeeping kept for every key and alias a resource has seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata<K> {
    /// The entry has to be loaded again before its data can be trusted.
    ///
    /// Entries start out outdated and are cleared by a successful load or an explicit `set`.
    pub outdated: bool,
    /// A load covering this entry is in flight.
    pub loading: bool,
    /// A load covering this entry has completed successfully at least once.
    pub loaded: bool,
    /// The error of the last failed load.
    pub exception: Option<LoadError>,
    /// Consumers currently using this entry.
    pub dependencies: Vec<UseId>,
    /// For alias entries, the keys each consumer's use was applied to.
    pub used_keys: BTreeMap<UseId, Vec<K>>,
    /// The includes this entry was loaded with.
    pub includes: BTreeSet<String>,
    /// Loaded pages, for entries of paginated targets.
    pub offset: PageInfo<K>,
}

impl<K> Default for Metadata<K> {
    fn default() -> Self {
        Self {
            outdated: true,
            loading: false,
            loaded: false,
            exception: None,
            dependencies: Vec::new(),
            used_keys: BTreeMap::new(),
            includes: BTreeSet::new(),
            offset: PageInfo::default(),
        }
    }
}

impl<K> Metadata<K> {
    /// Returns `true` if every include of `includes` has been loaded.
    pub fn has_includes(&self, includes: &BTreeSet<String>) -> bool {
        includes.is_subset(&self.includes)
    }

    pub fn is_in_use(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

type Factory<K, M> = Box<dyn Fn(&MetaKey<K>) -> M + Send + Sync>;

/// Per-key metadata, kept next to the data of a resource.
///
/// Entries are created on first access through a factory and are never shared between keys.
pub struct MetadataStore<K, M> {
    entries: HashMap<MetaKey<K>, M>,
    factory: Factory<K, M>,
}

impl<K, M> std::fmt::Debug for MetadataStore<K, M>
where
    K: std::fmt::Debug,
    M: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("entries", &self.entries)
            .finish()
    }
}

impl<K: 'static, M: Default + 'static> Default for MetadataStore<K, M> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            factory: Box::new(|_: &MetaKey<K>| M::default()),
        }
    }
}

impl<K, M> MetadataStore<K, M>
where
    K: Clone + Eq + Hash,
{
    pub fn new(factory: impl Fn(&MetaKey<K>) -> M + Send + Sync + 'static) -> Self {
        Self {
            entries: HashMap::new(),
            factory: Box::new(factory),
        }
    }

    /// Returns the entry for `key`, creating it if it does not exist yet.
    pub fn get(&mut self, key: &MetaKey<K>) -> &mut M {
        let factory = &self.factory;
        self.entries
            .entry(key.clone())
            .or_insert_with(|| factory(key))
    }

    /// Returns the entry for `key` without creating it.
    pub fn peek(&self, key: &MetaKey<K>) -> Option<&M> {
        self.entries.get(key)
    }

    pub fn peek_mut(&mut self, key: &MetaKey<K>) -> Option<&mut M> {
        self.entries.get_mut(key)
    }

    pub fn has(&self, key: &MetaKey<K>) -> bool {
        self.entries.contains_key(key)
    }

    pub fn delete(&mut self, key: &MetaKey<K>) -> Option<M> {
        self.entries.remove(key)
    }

    /// Applies `f` to the entries of the alias and of every key in `targets`.
    pub fn update(&mut self, targets: &KeyTargets<K>, mut f: impl FnMut(&mut M)) {
        for key in targets.meta_keys() {
            f(self.get(&key));
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &M> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
