//! Storage flavours behind a [`CachedResource`](crate::CachedResource).
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::aliases::AliasRegistry;
use crate::error::KeyError;
use crate::key::{AliasToken, ResourceAlias, ResourceKey};

/// Aliases over the children of a tree path, given as the `path` parameter.
pub const TREE_CHILDREN: AliasToken = AliasToken::new("tree-children");

/// Aliases over the top-level nodes of a tree.
pub const TREE_ROOT_CHILDREN: AliasToken = AliasToken::new("tree-root-children");

/// Creates the alias key for the children of the node at `path`.
pub fn tree_children_key(path: &str) -> ResourceKey<String> {
    ResourceAlias::new(TREE_CHILDREN)
        .with_param("path", path)
        .into()
}

/// Holds the values of a resource.
pub trait ResourceStore<K>: Default + Send + 'static {
    type Value;

    fn get(&self, key: &K) -> Option<&Self::Value>;

    fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a value, returning the previous one.
    fn insert(&mut self, key: K, value: Self::Value) -> Option<Self::Value>;

    fn remove(&mut self, key: &K) -> Option<Self::Value>;

    /// Returns all keys holding a value.
    fn keys(&self) -> Vec<K>;

    /// Returns the keys below `parent`, or the top-level keys for `None`.
    fn children(&self, _parent: Option<&K>) -> Vec<K> {
        Vec::new()
    }

    /// Returns `false` if the store cannot hold a value under `key`.
    fn validate_key(_key: &K) -> bool {
        true
    }

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers the aliases this flavour provides on top of the common ones.
    fn register_aliases(_aliases: &mut AliasRegistry<K>) {}
}

/// Values indexed by their key.
#[derive(Debug, Clone)]
pub struct MapStore<K, V> {
    entries: BTreeMap<K, V>,
}

impl<K, V> Default for MapStore<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K, V> ResourceStore<K> for MapStore<K, V>
where
    K: Ord + Clone + Send + 'static,
    V: Send + 'static,
{
    type Value = V;

    fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    fn keys(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone)]
struct TreeNode<V> {
    value: Option<V>,
    children: BTreeSet<String>,
}

impl<V> Default for TreeNode<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeSet::new(),
        }
    }
}

/// Values indexed by slash-delimited paths, like `connection/schema/table`.
///
/// Every node owns the paths of its children. Setting a value creates all missing ancestors as
/// nodes without a value. Removing a value never touches descendants: a node that still has
/// children stays in place without a value, otherwise it is pruned together with all ancestors
/// that are left without value and children.
pub struct TreeStore<V> {
    nodes: BTreeMap<String, TreeNode<V>>,
    roots: BTreeSet<String>,
}

impl<V> Default for TreeStore<V> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            roots: BTreeSet::new(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for TreeStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.nodes.iter().map(|(path, node)| (path, &node.value)))
            .finish()
    }
}

fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

impl<V> TreeStore<V> {
    fn link(&mut self, path: &str) {
        let mut current = path.to_owned();
        self.nodes.entry(current.clone()).or_default();
        loop {
            match parent_path(&current).map(str::to_owned) {
                Some(parent) => {
                    let linked = self.nodes.contains_key(&parent);
                    self.nodes
                        .entry(parent.clone())
                        .or_default()
                        .children
                        .insert(current);
                    if linked {
                        break;
                    }
                    current = parent;
                }
                None => {
                    self.roots.insert(current);
                    break;
                }
            }
        }
    }

    fn prune(&mut self, path: &str) {
        let mut current = path.to_owned();
        loop {
            let Some(node) = self.nodes.get(&current) else {
                break;
            };
            if node.value.is_some() || !node.children.is_empty() {
                break;
            }
            self.nodes.remove(&current);

            match parent_path(&current).map(str::to_owned) {
                Some(parent) => {
                    if let Some(parent_node) = self.nodes.get_mut(&parent) {
                        parent_node.children.remove(&current);
                    }
                    current = parent;
                }
                None => {
                    self.roots.remove(&current);
                    break;
                }
            }
        }
    }

    fn present(&self, paths: &BTreeSet<String>) -> Vec<String> {
        paths
            .iter()
            .filter(|path| {
                self.nodes
                    .get(*path)
                    .is_some_and(|node| node.value.is_some())
            })
            .cloned()
            .collect()
    }
}

impl<V: Send + 'static> ResourceStore<String> for TreeStore<V> {
    type Value = V;

    fn get(&self, key: &String) -> Option<&V> {
        self.nodes.get(key).and_then(|node| node.value.as_ref())
    }

    fn insert(&mut self, key: String, value: V) -> Option<V> {
        self.link(&key);
        self.nodes
            .get_mut(&key)
            .and_then(|node| node.value.replace(value))
    }

    fn remove(&mut self, key: &String) -> Option<V> {
        let value = self.nodes.get_mut(key)?.value.take();
        self.prune(key);
        value
    }

    fn keys(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.value.is_some())
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn children(&self, parent: Option<&String>) -> Vec<String> {
        match parent {
            Some(parent) => match self.nodes.get(parent) {
                Some(node) => self.present(&node.children),
                None => Vec::new(),
            },
            None => self.present(&self.roots),
        }
    }

    fn validate_key(key: &String) -> bool {
        !key.is_empty() && key.split('/').all(|segment| !segment.is_empty())
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }

    fn len(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| node.value.is_some())
            .count()
    }

    fn register_aliases(aliases: &mut AliasRegistry<String>) {
        aliases.replace(TREE_CHILDREN, |alias, ctx| {
            let path = alias
                .param("path")
                .and_then(|path| path.as_str())
                .ok_or(KeyError::MalformedAlias {
                    token: alias.token(),
                    reason: "the path parameter must be a string",
                })?;
            Ok(ResourceKey::List(ctx.children(Some(&path.to_owned()))))
        });
        aliases.replace(TREE_ROOT_CHILDREN, |_, ctx| {
            Ok(ResourceKey::List(ctx.children(None)))
        });
    }
}
