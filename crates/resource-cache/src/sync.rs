//! Propagation of changes between resources.
//!
//! A resource can be synced with a dependency: whenever entries of the dependency are marked
//! outdated or deleted, the mapped entries of the dependent resource follow. Syncing never
//! copies data. Dependencies form a graph that must stay acyclic.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::SyncError;
use crate::events::ResourceEvents;
use crate::key::{Key, ResourceKey};
use crate::loader::ResourceLoader;
use crate::resource::{CachedResource, ResourceInner};
use crate::store::ResourceStore;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(0);

/// Uniquely identifies a resource within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resource as a node of the dependency graph, regardless of its key and value types.
pub trait ResourceNode: Send + Sync {
    fn id(&self) -> ResourceId;

    fn name(&self) -> &str;

    /// The resources this resource was synced with.
    fn dependencies(&self) -> Vec<Arc<dyn ResourceNode>>;
}

impl<K, V, S, L> ResourceNode for ResourceInner<K, V, S, L>
where
    K: Key,
    V: Send + Sync + 'static,
    S: ResourceStore<K, Value = V>,
    L: ResourceLoader<K, V>,
{
    fn id(&self) -> ResourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<Arc<dyn ResourceNode>> {
        self.dependencies.lock().clone()
    }
}

/// A resource other resources can be synced with.
pub trait SyncSource<K> {
    fn node(&self) -> Arc<dyn ResourceNode>;

    fn events(&self) -> &ResourceEvents<K>;
}

impl<K, V, S, L> SyncSource<K> for CachedResource<K, V, S, L>
where
    K: Key,
    V: Clone + Send + Sync + 'static,
    S: ResourceStore<K, Value = V>,
    L: ResourceLoader<K, V>,
{
    fn node(&self) -> Arc<dyn ResourceNode> {
        self.inner.clone()
    }

    fn events(&self) -> &ResourceEvents<K> {
        &self.inner.events
    }
}

/// Returns whether `node` reaches the resource `target` through its dependencies.
fn depends_on(node: &dyn ResourceNode, target: ResourceId) -> bool {
    let mut stack = node.dependencies();
    let mut visited = Vec::new();
    while let Some(next) = stack.pop() {
        let id = next.id();
        if id == target {
            return true;
        }
        if visited.contains(&id) {
            continue;
        }
        visited.push(id);
        stack.extend(next.dependencies());
    }
    false
}

impl<K, V, S, L> CachedResource<K, V, S, L>
where
    K: Key,
    V: Clone + Send + Sync + 'static,
    S: ResourceStore<K, Value = V>,
    L: ResourceLoader<K, V>,
{
    /// Returns this resource as a node of the dependency graph.
    pub fn node(&self) -> Arc<dyn ResourceNode> {
        self.inner.clone()
    }

    /// Follows outdating and deletion of entries in `dependency`.
    ///
    /// `map_key` translates keys of the dependency into keys of this resource. Keys it maps to
    /// `None` are ignored. Syncing with `None` does nothing, so optional dependencies can be
    /// passed through unchanged.
    ///
    /// Fails if the dependency already depends on this resource.
    pub fn sync<K2: 'static, R, F>(&self, dependency: Option<&R>, map_key: F) -> Result<(), SyncError>
    where
        R: SyncSource<K2>,
        F: Fn(&ResourceKey<K2>) -> Option<ResourceKey<K>> + Send + Sync + 'static,
    {
        let Some(dependency) = dependency else {
            tracing::debug!(resource = self.name(), "Skipping sync without a dependency");
            return Ok(());
        };

        let node = dependency.node();
        if node.id() == self.id() || depends_on(node.as_ref(), self.id()) {
            return Err(SyncError::Cycle {
                resource: self.name().to_owned(),
                dependency: node.name().to_owned(),
            });
        }

        tracing::debug!(
            resource = self.name(),
            dependency = node.name(),
            "Syncing resource"
        );
        self.inner.dependencies.lock().push(node);

        let map_key = Arc::new(map_key);
        let events = dependency.events();

        let weak = Arc::downgrade(&self.inner);
        let map = map_key.clone();
        let outdated = events.outdated.subscribe_scoped(move |key| {
            if let Some(resource) = upgrade(&weak) {
                if let Some(key) = map(key) {
                    if let Err(error) = resource.mark_outdated(key) {
                        tracing::warn!(resource = resource.name(), %error, "Failed to sync outdated entries");
                    }
                }
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let map = map_key;
        let deleted = events.deleted.subscribe_scoped(move |key| {
            if let Some(resource) = upgrade(&weak) {
                if let Some(key) = map(key) {
                    if let Err(error) = resource.delete(key) {
                        tracing::warn!(resource = resource.name(), %error, "Failed to sync deleted entries");
                    }
                }
            }
        });

        // dropping this resource removes the handlers from the dependency
        self.inner.subscriptions.lock().extend([outdated, deleted]);
        Ok(())
    }
}

fn upgrade<K, V, S, L>(weak: &Weak<ResourceInner<K, V, S, L>>) -> Option<CachedResource<K, V, S, L>> {
    weak.upgrade().map(|inner| CachedResource { inner })
}
