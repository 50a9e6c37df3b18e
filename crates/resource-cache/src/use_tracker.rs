//! Reference counting of the consumers of a resource.
//!
//! Consumers register their interest in a key with a [`UseId`]. Interest is recorded on the
//! metadata of the alias as requested and on every key the alias currently resolves to, so both
//! "is this alias in use" and "is this particular key in use" can be answered. The tracker never
//! evicts anything itself.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aliases::KeyTargets;
use crate::key::ResourceKey;
use crate::metadata::{MetaKey, Metadata, MetadataStore};

/// Identifies a consumer of resource entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UseId(String);

impl UseId {
    /// Generates a new random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UseId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for UseId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for UseId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for UseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Emitted whenever a consumer starts or stops using a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseEvent<K> {
    pub id: UseId,
    pub key: ResourceKey<K>,
    /// Whether the key is still in use by any consumer after the transition.
    pub is_in_use: bool,
}

/// Records consumer interest in the metadata of a resource.
pub struct ResourceUseTracker<'a, K> {
    metadata: &'a mut MetadataStore<K, Metadata<K>>,
}

impl<'a, K> ResourceUseTracker<'a, K>
where
    K: Clone + Eq + std::hash::Hash,
{
    pub fn new(metadata: &'a mut MetadataStore<K, Metadata<K>>) -> Self {
        Self { metadata }
    }

    /// Registers `id` on every entry of `targets`. Registering the same id twice is a no-op.
    ///
    /// For an alias, the keys it resolved to are remembered so that [`free_targets`] reaches
    /// them even after the alias resolves differently.
    ///
    /// [`free_targets`]: Self::free_targets
    pub fn use_targets(&mut self, targets: &KeyTargets<K>, id: &UseId) {
        self.metadata.update(targets, |meta| {
            if !meta.dependencies.contains(id) {
                meta.dependencies.push(id.clone());
            }
        });

        if let Some(alias) = &targets.alias {
            let meta = self.metadata.get(&MetaKey::Alias(alias.clone()));
            let used = meta.used_keys.entry(id.clone()).or_default();
            for key in &targets.keys {
                if !used.contains(key) {
                    used.push(key.clone());
                }
            }
        }
    }

    /// Removes `id` from every entry of `targets`, and from the keys an earlier use of the
    /// alias was applied to.
    pub fn free_targets(&mut self, targets: &KeyTargets<K>, id: &UseId) {
        let mut keys = targets.keys.clone();
        if let Some(alias) = &targets.alias {
            if let Some(meta) = self.metadata.peek_mut(&MetaKey::Alias(alias.clone())) {
                meta.dependencies.retain(|dependency| dependency != id);
                keys.extend(meta.used_keys.remove(id).unwrap_or_default());
            }
        }

        for key in keys {
            if let Some(meta) = self.metadata.peek_mut(&MetaKey::Key(key)) {
                meta.dependencies.retain(|dependency| dependency != id);
            }
        }
    }

    /// Returns whether any consumer uses the entries of `targets`.
    ///
    /// For an alias only the alias entry is checked. Keys the alias resolves to may be in use
    /// through other keys.
    pub fn is_in_use(&self, targets: &KeyTargets<K>) -> bool {
        match &targets.alias {
            Some(alias) => self.is_entry_in_use(&MetaKey::Alias(alias.clone())),
            None => targets
                .keys
                .iter()
                .any(|key| self.is_entry_in_use(&MetaKey::Key(key.clone()))),
        }
    }

    /// Returns whether any entry of the resource is in use.
    pub fn is_resource_in_use(&self) -> bool {
        self.metadata.values().any(Metadata::is_in_use)
    }

    pub fn has_use_id(&self, id: &UseId) -> bool {
        self.metadata
            .values()
            .any(|meta| meta.dependencies.contains(id))
    }

    fn is_entry_in_use(&self, key: &MetaKey<K>) -> bool {
        self.metadata.peek(key).is_some_and(Metadata::is_in_use)
    }
}
