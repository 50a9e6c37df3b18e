//! The cache engine.
//!
//! A [`CachedResource`] mirrors entries of a remote source into memory. Reads never trigger a
//! load. [`CachedResource::load`] fetches missing or outdated entries through the
//! [`ResourceLoader`] and deduplicates concurrent loads of the same key, so only one request is
//! in flight per key.
//!
//! Loads are spawned on the current tokio runtime when they start, and run to completion even if
//! every caller drops the returned future.
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, Shared};
use futures::{FutureExt, TryFutureExt};
use parking_lot::{Mutex, MutexGuard};

use crate::aliases::{AliasContext, AliasRegistry, KeyTargets};
use crate::config::ResourceConfig;
use crate::error::{KeyError, LoadError, ResourceError};
use crate::events::{DataError, ResourceEvents, Subscribers, Subscription};
use crate::key::{AliasToken, Key, ResourceAlias, ResourceKey};
use crate::loader::{LoadRequest, ResourceLoader};
use crate::metadata::{MetaKey, Metadata, MetadataStore};
use crate::pagination::{
    OFFSET_PAGE, OFFSET_PAGE_LIST, PageInfo, offset_page_key, page_target, page_window,
};
use crate::store::{MapStore, ResourceStore, TreeStore};
use crate::sync::{ResourceId, ResourceNode};
use crate::use_tracker::{ResourceUseTracker, UseEvent, UseId};
use crate::utils::futures::{CallOnDrop, with_load_timeout};

/// Aliases over every key currently holding a value.
pub const ALL_ITEMS: AliasToken = AliasToken::new("all-items");

/// A resource holding values by key.
pub type CachedMapResource<K, V, L> = CachedResource<K, V, MapStore<K, V>, L>;

/// A resource holding values by slash-delimited path.
pub type CachedTreeResource<V, L> = CachedResource<String, V, TreeStore<V>, L>;

type LoadResult<V> = Result<Arc<Vec<V>>, LoadError>;
type LoadChannel<V> = Shared<oneshot::Receiver<LoadResult<V>>>;

struct InFlightLoad<K, V> {
    id: u64,
    key: ResourceKey<K>,
    includes: BTreeSet<String>,
    superseded: Arc<AtomicBool>,
    channel: LoadChannel<V>,
}

/// A load registered as in flight whose loader has not been called yet.
struct PendingLoad<K, V> {
    id: u64,
    request: LoadRequest<K>,
    targets: KeyTargets<K>,
    superseded: Arc<AtomicBool>,
    sender: oneshot::Sender<LoadResult<V>>,
}

enum Lookup<K, V> {
    Cached(Vec<V>),
    Joined(LoadChannel<V>),
    Started(PendingLoad<K, V>, LoadChannel<V>),
}

fn page_list_key<K: Clone>(target: &ResourceKey<K>) -> MetaKey<K> {
    MetaKey::Alias(ResourceAlias::new(OFFSET_PAGE_LIST).with_parent(target.clone()))
}

pub(crate) struct ResourceState<K, S> {
    pub(crate) store: S,
    pub(crate) metadata: MetadataStore<K, Metadata<K>>,
    pub(crate) aliases: AliasRegistry<K>,
}

struct ResolveCx<'a, K, S> {
    store: &'a S,
    metadata: &'a MetadataStore<K, Metadata<K>>,
}

impl<K: Key, S: ResourceStore<K>> AliasContext<K> for ResolveCx<'_, K, S> {
    fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    fn children(&self, parent: Option<&K>) -> Vec<K> {
        self.store.children(parent)
    }

    fn page_info(&self, target: &ResourceKey<K>) -> Option<&PageInfo<K>> {
        self.metadata
            .peek(&page_list_key(target))
            .map(|meta| &meta.offset)
    }
}

impl<K: Key, S: ResourceStore<K>> ResourceState<K, S> {
    fn new() -> Self {
        let mut aliases = AliasRegistry::default();
        aliases.replace(ALL_ITEMS, |_, ctx| Ok(ResourceKey::List(ctx.keys())));
        aliases.replace(OFFSET_PAGE, |alias, ctx| {
            let (offset, limit) = page_window(alias)?;
            let items = ctx
                .page_info(page_target(alias)?)
                .map(|info| info.items_in(offset, limit))
                .unwrap_or_default();
            Ok(ResourceKey::List(items))
        });
        aliases.replace(OFFSET_PAGE_LIST, |alias, ctx| {
            let items = ctx
                .page_info(page_target(alias)?)
                .map(PageInfo::items)
                .unwrap_or_default();
            Ok(ResourceKey::List(items))
        });
        S::register_aliases(&mut aliases);

        Self {
            store: S::default(),
            metadata: MetadataStore::default(),
            aliases,
        }
    }

    fn cx(&self) -> ResolveCx<'_, K, S> {
        ResolveCx {
            store: &self.store,
            metadata: &self.metadata,
        }
    }

    fn resolve(&self, key: &ResourceKey<K>) -> Result<ResourceKey<K>, KeyError> {
        self.aliases.transform_to_key(key, &self.cx())
    }

    fn expand(&self, key: &ResourceKey<K>) -> Result<KeyTargets<K>, KeyError> {
        self.aliases.expand(key, &self.cx())
    }

    fn page_info(&self, target: &ResourceKey<K>) -> Option<&PageInfo<K>> {
        self.metadata
            .peek(&page_list_key(target))
            .map(|meta| &meta.offset)
    }

    fn key_outdated(&self, key: &K) -> bool {
        self.metadata
            .peek(&MetaKey::Key(key.clone()))
            .is_none_or(|meta| meta.outdated)
    }

    fn key_loaded(&self, key: &K, includes: &BTreeSet<String>) -> bool {
        self.store.contains(key)
            && self
                .metadata
                .peek(&MetaKey::Key(key.clone()))
                .map_or(includes.is_empty(), |meta| meta.has_includes(includes))
    }

    fn is_outdated(&self, key: &ResourceKey<K>) -> Result<bool, KeyError> {
        let alias = match key {
            ResourceKey::Flat(key) => return Ok(self.key_outdated(key)),
            ResourceKey::List(keys) => return Ok(keys.iter().any(|key| self.key_outdated(key))),
            ResourceKey::Alias(alias) => alias,
        };

        let own = if alias.is(OFFSET_PAGE) {
            let (offset, limit) = page_window(alias)?;
            !self
                .page_info(page_target(alias)?)
                .is_some_and(|info| info.is_loaded(offset, limit))
        } else if alias.is(OFFSET_PAGE_LIST) {
            self.page_info(page_target(alias)?)
                .is_none_or(|info| info.pages().is_empty() || info.pages().iter().any(|p| p.outdated))
        } else {
            self.metadata
                .peek(&MetaKey::Alias(alias.clone()))
                .is_none_or(|meta| meta.outdated)
        };

        let targets = self.expand(key)?;
        Ok(own || targets.keys.iter().any(|key| self.key_outdated(key)))
    }

    fn is_loaded(&self, key: &ResourceKey<K>, includes: &BTreeSet<String>) -> Result<bool, KeyError> {
        let alias = match key {
            ResourceKey::Flat(key) => return Ok(self.key_loaded(key, includes)),
            ResourceKey::List(keys) => {
                return Ok(keys.iter().all(|key| self.key_loaded(key, includes)));
            }
            ResourceKey::Alias(alias) => alias,
        };

        let own = if alias.is(OFFSET_PAGE) {
            let (offset, limit) = page_window(alias)?;
            self.page_info(page_target(alias)?)
                .is_some_and(|info| info.is_loaded(offset, limit))
        } else if alias.is(OFFSET_PAGE_LIST) {
            self.page_info(page_target(alias)?)
                .is_some_and(|info| !info.pages().is_empty())
        } else {
            self.metadata
                .peek(&MetaKey::Alias(alias.clone()))
                .is_some_and(|meta| meta.loaded && meta.has_includes(includes))
        };

        let targets = self.expand(key)?;
        Ok(own && targets.keys.iter().all(|key| self.key_loaded(key, includes)))
    }

    /// Returns the includes the entries of `targets` were loaded with.
    fn loaded_includes(&self, targets: &KeyTargets<K>) -> BTreeSet<String> {
        targets
            .meta_keys()
            .filter_map(|key| self.metadata.peek(&key))
            .flat_map(|meta| meta.includes.iter().cloned())
            .collect()
    }

    fn values(&self, key: &ResourceKey<K>) -> Result<Vec<S::Value>, KeyError>
    where
        S::Value: Clone,
    {
        let keys = self.resolve(key)?.to_list()?;
        Ok(keys
            .iter()
            .filter_map(|key| self.store.get(key).cloned())
            .collect())
    }

    fn mark_outdated(&mut self, key: &ResourceKey<K>) -> Result<(), KeyError> {
        let targets = self.expand(key)?;
        self.metadata.update(&targets, |meta| meta.outdated = true);

        if let ResourceKey::Alias(alias) = key {
            if alias.is(OFFSET_PAGE) {
                let (offset, limit) = page_window(alias)?;
                let list_key = page_list_key(page_target(alias)?);
                if let Some(meta) = self.metadata.peek_mut(&list_key) {
                    meta.offset.mark_outdated_in(offset, limit);
                }
            } else if alias.is(OFFSET_PAGE_LIST) {
                let list_key = page_list_key(page_target(alias)?);
                if let Some(meta) = self.metadata.peek_mut(&list_key) {
                    meta.offset.mark_outdated();
                }
            }
        }
        // pages loaded from this key as a target
        if let Some(meta) = self.metadata.peek_mut(&page_list_key(key)) {
            meta.offset.mark_outdated();
        }
        Ok(())
    }

    /// Writes the result of a successful load and returns the loaded values.
    fn apply_load(
        &mut self,
        request: &LoadRequest<K>,
        started: KeyTargets<K>,
        entries: Vec<(K, S::Value)>,
    ) -> Arc<Vec<S::Value>>
    where
        S::Value: Clone,
    {
        let mut keys = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            keys.push(key.clone());
            values.push(value.clone());
            self.store.insert(key, value);
        }

        if let Some(alias) = request.key.as_alias().filter(|alias| alias.is(OFFSET_PAGE)) {
            if let (Ok((offset, limit)), Ok(target)) = (page_window(alias), page_target(alias)) {
                self.metadata
                    .get(&page_list_key(target))
                    .offset
                    .set_page(offset, limit, keys.clone());
            }
        }

        let mut targets = started;
        if let Ok(resolved) = self.expand(&request.key) {
            targets.extend(resolved.keys);
        }
        targets.extend(keys);

        self.metadata.update(&targets, |meta| {
            meta.loading = false;
            meta.loaded = true;
            meta.outdated = false;
            meta.exception = None;
            meta.includes.extend(request.includes.iter().cloned());
        });

        Arc::new(values)
    }

    fn fail_load(&mut self, request: &LoadRequest<K>, started: KeyTargets<K>, error: &LoadError) {
        let mut targets = started;
        if let Ok(resolved) = self.expand(&request.key) {
            targets.extend(resolved.keys);
        }
        self.metadata.update(&targets, |meta| {
            meta.loading = false;
            meta.exception = Some(error.clone());
        });
    }
}

pub(crate) struct ResourceInner<K, V, S, L> {
    pub(crate) id: ResourceId,
    pub(crate) name: String,
    loader: L,
    config: ResourceConfig,
    state: Mutex<ResourceState<K, S>>,
    loads: Arc<Mutex<Vec<InFlightLoad<K, V>>>>,
    next_load: AtomicU64,
    pub(crate) events: ResourceEvents<K>,
    pub(crate) dependencies: Mutex<Vec<Arc<dyn ResourceNode>>>,
    pub(crate) subscriptions: Mutex<Vec<Subscription>>,
}

impl<K, V, S, L> ResourceInner<K, V, S, L>
where
    K: Key,
    V: Clone + Send + Sync + 'static,
    S: ResourceStore<K, Value = V>,
    L: ResourceLoader<K, V>,
{
    fn finish_load(
        &self,
        request: &LoadRequest<K>,
        started: KeyTargets<K>,
        superseded: &AtomicBool,
        result: Result<Vec<(K, V)>, LoadError>,
    ) -> LoadResult<V> {
        let name = self.name.as_str();
        let key = &request.key;

        let mut state = self.state.lock();
        if superseded.load(Ordering::Acquire) {
            drop(state);
            metric!(counter("resources.load.discarded") += 1, "resource" => name);
            tracing::debug!(resource = name, %key, "Discarding result of superseded load");
            return result.map(|entries| Arc::new(entries.into_iter().map(|(_, v)| v).collect()));
        }

        match result {
            Ok(entries) => {
                let values = state.apply_load(request, started, entries);
                drop(state);
                metric!(histogram("resources.load.entries") = values.len() as u64, "resource" => name);
                tracing::trace!(resource = name, %key, count = values.len(), "Loaded resource");
                self.events.updated.emit(key);
                Ok(values)
            }
            Err(error) => {
                state.fail_load(request, started, &error);
                drop(state);
                metric!(counter("resources.load.error") += 1, "resource" => name);
                tracing::debug!(resource = name, %key, %error, "Failed to load resource");
                self.events.error.emit(&DataError {
                    key: key.clone(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn is_same_key(&self, a: &ResourceKey<K>, b: &ResourceKey<K>) -> bool {
        a.is_equal_by(b, false, &|x: &K, y: &K| self.loader.is_key_equal(x, y))
    }
}

/// A keyed cache of remote entries.
///
/// Cloning a resource is cheap and yields a handle to the same cache.
pub struct CachedResource<K, V, S, L> {
    pub(crate) inner: Arc<ResourceInner<K, V, S, L>>,
}

impl<K, V, S, L> Clone for CachedResource<K, V, S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, S, L> fmt::Debug for CachedResource<K, V, S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedResource")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .finish()
    }
}

impl<K, V, S, L> CachedResource<K, V, S, L>
where
    K: Key,
    V: Clone + Send + Sync + 'static,
    S: ResourceStore<K, Value = V>,
    L: ResourceLoader<K, V>,
{
    pub fn new(name: impl Into<String>, loader: L, config: ResourceConfig) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                id: ResourceId::next(),
                name: name.into(),
                loader,
                config,
                state: Mutex::new(ResourceState::new()),
                loads: Arc::new(Mutex::new(Vec::new())),
                next_load: AtomicU64::new(0),
                events: ResourceEvents::default(),
                dependencies: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.inner.config
    }

    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    fn state(&self) -> MutexGuard<'_, ResourceState<K, S>> {
        self.inner.state.lock()
    }

    fn is_valid(&self, key: &K) -> bool {
        S::validate_key(key) && self.inner.loader.validate_key(key)
    }

    fn find_invalid<'k>(&self, key: &'k ResourceKey<K>) -> Option<&'k K> {
        match key {
            ResourceKey::Flat(key) => (!self.is_valid(key)).then_some(key),
            ResourceKey::List(keys) => keys.iter().find(|key| !self.is_valid(key)),
            ResourceKey::Alias(alias) => alias.parent().and_then(|parent| self.find_invalid(parent)),
        }
    }

    fn check_key(&self, key: &ResourceKey<K>) -> Result<(), ResourceError> {
        match self.find_invalid(key) {
            Some(invalid) => {
                tracing::warn!(resource = self.name(), key = %invalid, "Invalid resource key");
                Err(ResourceError::InvalidKey(invalid.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Returns the cached value of `key` without loading it.
    pub fn get(&self, key: &K) -> Option<V> {
        if self.check_key(&ResourceKey::flat(key.clone())).is_err() {
            return None;
        }
        self.state().store.get(key).cloned()
    }

    /// Returns the cached values of every key `key` resolves to, in order.
    ///
    /// Invalid keys yield no values.
    pub fn get_many(&self, key: &ResourceKey<K>) -> Result<Vec<Option<V>>, KeyError> {
        if self.check_key(key).is_err() {
            return Ok(Vec::new());
        }
        let state = self.state();
        let keys = state.resolve(key)?.to_list()?;
        Ok(keys
            .iter()
            .map(|key| state.store.get(key).cloned())
            .collect())
    }

    pub fn has(&self, key: &K) -> bool {
        self.state().store.contains(key)
    }

    /// Returns all keys holding a value.
    pub fn keys(&self) -> Vec<K> {
        self.state().store.keys()
    }

    /// Ensures the entries of `key` are present and up to date.
    ///
    /// Resolves to the values of `key`. Entries that are loaded and not outdated are returned
    /// from memory. A load for a key that is already loading joins the load in flight.
    ///
    /// The load is spawned before this returns, which requires a tokio runtime.
    pub fn load(&self, key: ResourceKey<K>) -> BoxFuture<'static, Result<Vec<V>, ResourceError>> {
        self.start_load(key, BTreeSet::new(), false)
    }

    /// Like [`load`](Self::load), but also requires the entries to be loaded with `includes`.
    pub fn load_with_includes(
        &self,
        key: ResourceKey<K>,
        includes: &[&str],
    ) -> BoxFuture<'static, Result<Vec<V>, ResourceError>> {
        let includes = includes.iter().map(|include| include.to_string()).collect();
        self.start_load(key, includes, false)
    }

    /// Loads a single key, resolving to its value if the loader returned one.
    pub fn load_one(&self, key: K) -> BoxFuture<'static, Result<Option<V>, ResourceError>> {
        self.load(ResourceKey::flat(key))
            .map_ok(|values| values.into_iter().next())
            .boxed()
    }

    /// Marks `key` outdated and loads it again.
    ///
    /// A load of the same key that is still in flight is superseded: its callers receive its
    /// result, but only the result of this load is written.
    pub fn refresh(&self, key: ResourceKey<K>) -> BoxFuture<'static, Result<Vec<V>, ResourceError>> {
        self.start_load(key, BTreeSet::new(), true)
    }

    fn start_load(
        &self,
        key: ResourceKey<K>,
        includes: BTreeSet<String>,
        refresh: bool,
    ) -> BoxFuture<'static, Result<Vec<V>, ResourceError>> {
        if let Err(err) = self.check_key(&key) {
            return future::ready(Err(err)).boxed();
        }
        metric!(counter("resources.access") += 1, "resource" => self.name());

        let channel = match self.lookup(key, includes, refresh) {
            Err(err) => return future::ready(Err(err.into())).boxed(),
            Ok(Lookup::Cached(values)) => return future::ready(Ok(values)).boxed(),
            Ok(Lookup::Joined(channel)) => channel,
            Ok(Lookup::Started(pending, channel)) => {
                self.spawn_load(pending);
                channel
            }
        };

        let name = self.inner.name.clone();
        channel
            .unwrap_or_else(move |_cancelled_error| {
                tracing::error!(resource = %name, "load channel dropped");
                Err(LoadError::Interrupted)
            })
            .map(|result| match result {
                Ok(values) => Ok(values.as_ref().clone()),
                Err(error) => Err(ResourceError::Load(error)),
            })
            .boxed()
    }

    /// Decides whether a load is served from memory, joins a load in flight, or starts anew.
    fn lookup(
        &self,
        key: ResourceKey<K>,
        mut includes: BTreeSet<String>,
        refresh: bool,
    ) -> Result<Lookup<K, V>, KeyError> {
        let name = self.name();
        let mut loads = self.inner.loads.lock();
        let mut state = self.state();

        let position = loads
            .iter()
            .position(|load| self.inner.is_same_key(&load.key, &key));

        if refresh {
            // loaded pages stay valid until the reload replaces them
            let targets = state.expand(&key)?;
            includes.extend(state.loaded_includes(&targets));
            state.metadata.update(&targets, |meta| meta.outdated = true);
        } else if let Some(position) = position {
            if includes.is_subset(&loads[position].includes) {
                metric!(counter("resources.load.coalesced") += 1, "resource" => name);
                tracing::trace!(resource = name, %key, "Joining load in flight");
                return Ok(Lookup::Joined(loads[position].channel.clone()));
            }
            includes.extend(loads[position].includes.iter().cloned());
        } else if !state.is_outdated(&key)? && state.is_loaded(&key, &includes)? {
            metric!(counter("resources.memory.hit") += 1, "resource" => name);
            return Ok(Lookup::Cached(state.values(&key)?));
        }

        if let Some(position) = position {
            let superseded = loads.swap_remove(position);
            superseded.superseded.store(true, Ordering::Release);
            tracing::debug!(resource = name, %key, "Superseding load in flight");
        }

        let targets = state.expand(&key)?;
        state.metadata.update(&targets, |meta| meta.loading = true);

        let id = self.inner.next_load.fetch_add(1, Ordering::Relaxed);
        let superseded = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();

        loads.push(InFlightLoad {
            id,
            key: key.clone(),
            includes: includes.clone(),
            superseded: superseded.clone(),
            channel: channel.clone(),
        });

        let pending = PendingLoad {
            id,
            request: LoadRequest {
                key,
                includes,
                refresh,
            },
            targets,
            superseded,
            sender,
        };
        Ok(Lookup::Started(pending, channel))
    }

    /// Calls the loader and spawns the load as a separate task.
    fn spawn_load(&self, pending: PendingLoad<K, V>) {
        let PendingLoad {
            id,
            request,
            targets,
            superseded,
            sender,
        } = pending;

        metric!(counter("resources.load.started") += 1, "resource" => self.name());
        tracing::debug!(resource = self.name(), key = %request.key, refresh = request.refresh, "Loading resource");

        let future = with_load_timeout(
            self.inner.loader.load(request.clone()),
            self.inner.config.load_timeout,
        );

        let loads = self.inner.loads.clone();
        let remove_load_token = CallOnDrop::new(move || {
            loads.lock().retain(|load| load.id != id);
        });

        let inner = self.inner.clone();
        let task = async move {
            let start = Instant::now();
            let result = future.await;
            metric!(timer("resources.load.duration") = start.elapsed(), "resource" => &inner.name);
            let result = inner.finish_load(&request, targets, &superseded, result);
            // The result is written before the load leaves the in-flight list, so callers either
            // join a load that will receive it or find the written data.
            drop(remove_load_token);
            sender.send(result).ok();
        };

        tokio::spawn(task);
    }

    /// Marks the entries of `key` outdated without touching their values.
    pub fn mark_outdated(&self, key: ResourceKey<K>) -> Result<(), ResourceError> {
        self.check_key(&key)?;
        self.state().mark_outdated(&key)?;

        metric!(counter("resources.outdated") += 1, "resource" => self.name());
        tracing::debug!(resource = self.name(), %key, "Marked resource outdated");
        self.inner.events.outdated.emit(&key);
        Ok(())
    }

    /// Stores a value, as if it had been loaded.
    pub fn set(&self, key: K, value: V) -> Result<(), ResourceError> {
        self.set_many(vec![(key, value)])
    }

    /// Stores several values at once. Nothing is stored if any key is invalid.
    pub fn set_many(&self, entries: Vec<(K, V)>) -> Result<(), ResourceError> {
        if entries.is_empty() {
            return Ok(());
        }
        let keys: Vec<K> = entries.iter().map(|(key, _)| key.clone()).collect();
        let key = match keys.as_slice() {
            [single] => ResourceKey::flat(single.clone()),
            _ => ResourceKey::List(keys.clone()),
        };
        self.check_key(&key)?;

        {
            let mut state = self.state();
            for (key, value) in entries {
                state.store.insert(key, value);
            }
            let targets = KeyTargets { alias: None, keys };
            state.metadata.update(&targets, |meta| {
                meta.outdated = false;
                meta.loaded = true;
                meta.exception = None;
            });
        }

        self.inner.events.updated.emit(&key);
        Ok(())
    }

    /// Removes the values and metadata of `key`.
    ///
    /// Emits a single deletion event if anything was removed.
    pub fn delete(&self, key: ResourceKey<K>) -> Result<(), ResourceError> {
        self.check_key(&key)?;

        let removed = {
            let mut state = self.state();
            let targets = state.expand(&key)?;
            let mut removed = false;
            for item in &targets.keys {
                removed |= state.store.remove(item).is_some();
                removed |= state.metadata.delete(&MetaKey::Key(item.clone())).is_some();
            }
            if let Some(alias) = targets.alias {
                removed |= state.metadata.delete(&MetaKey::Alias(alias)).is_some();
            }
            removed
        };

        if removed {
            metric!(counter("resources.deleted") += 1, "resource" => self.name());
            tracing::debug!(resource = self.name(), %key, "Deleted resource");
            self.inner.events.deleted.emit(&key);
        }
        Ok(())
    }

    /// Removes all values and metadata.
    pub fn clear(&self) {
        let keys = {
            let mut state = self.state();
            let keys = state.store.keys();
            state.store.clear();
            state.metadata.clear();
            keys
        };

        if !keys.is_empty() {
            self.inner.events.deleted.emit(&ResourceKey::List(keys));
        }
    }

    pub fn is_outdated(&self, key: &ResourceKey<K>) -> Result<bool, KeyError> {
        self.state().is_outdated(key)
    }

    /// Returns whether the entries of `key` hold values loaded with all `includes`.
    pub fn is_loaded(&self, key: &ResourceKey<K>, includes: &[&str]) -> Result<bool, KeyError> {
        let includes = includes.iter().map(|include| include.to_string()).collect();
        self.state().is_loaded(key, &includes)
    }

    /// Returns whether any load is in flight.
    pub fn is_loading(&self) -> bool {
        !self.inner.loads.lock().is_empty()
    }

    /// Returns whether a load covering `key` is in flight.
    pub fn is_loading_key(&self, key: &ResourceKey<K>) -> Result<bool, KeyError> {
        let state = self.state();
        let targets = state.expand(key)?;
        Ok(targets
            .meta_keys()
            .any(|key| state.metadata.peek(&key).is_some_and(|meta| meta.loading)))
    }

    /// Returns the error of the last failed load of `key`.
    pub fn exception(&self, key: &ResourceKey<K>) -> Result<Option<LoadError>, KeyError> {
        let state = self.state();
        let targets = state.expand(key)?;
        Ok(targets
            .meta_keys()
            .filter_map(|key| state.metadata.peek(&key))
            .find_map(|meta| meta.exception.clone()))
    }

    /// Returns a snapshot of the metadata of a single key.
    pub fn metadata(&self, key: &K) -> Option<Metadata<K>> {
        self.state().metadata.peek(&MetaKey::Key(key.clone())).cloned()
    }

    /// Registers a resolver for a new kind of alias.
    ///
    /// Resolvers run while the resource is locked and must not call back into it.
    pub fn add_alias<F>(&self, token: AliasToken, resolver: F) -> Result<(), KeyError>
    where
        F: Fn(&ResourceAlias<K>, &dyn AliasContext<K>) -> Result<ResourceKey<K>, KeyError>
            + Send
            + Sync
            + 'static,
    {
        self.state().aliases.add(token, resolver)
    }

    /// Overrides the resolver of an alias, including the built-in ones.
    pub fn replace_alias<F>(&self, token: AliasToken, resolver: F)
    where
        F: Fn(&ResourceAlias<K>, &dyn AliasContext<K>) -> Result<ResourceKey<K>, KeyError>
            + Send
            + Sync
            + 'static,
    {
        self.state().aliases.replace(token, resolver)
    }

    /// Resolves `key` against the current contents of the resource.
    pub fn transform_to_key(&self, key: &ResourceKey<K>) -> Result<ResourceKey<K>, KeyError> {
        self.state().resolve(key)
    }

    /// Returns the parameterless alias `key` currently resolves from, if any.
    pub fn transform_to_alias(&self, key: &ResourceKey<K>) -> ResourceKey<K> {
        let state = self.state();
        let eq = |a: &K, b: &K| self.inner.loader.is_key_equal(a, b);
        state.aliases.transform_to_alias(key, &state.cx(), &eq)
    }

    /// Returns the pages loaded for `target`.
    pub fn page_info(&self, target: &ResourceKey<K>) -> PageInfo<K> {
        self.state().page_info(target).cloned().unwrap_or_default()
    }

    pub fn next_page_offset(&self, target: &ResourceKey<K>) -> usize {
        self.state()
            .page_info(target)
            .map_or(0, PageInfo::next_page_offset)
    }

    pub fn has_next_page(&self, target: &ResourceKey<K>) -> bool {
        self.state()
            .page_info(target)
            .is_none_or(PageInfo::has_next_page)
    }

    /// Loads the page of `target` following the pages loaded so far.
    ///
    /// Uses the configured page size without a `limit`. Resolves to no values once the last page
    /// has been loaded.
    pub fn load_more(
        &self,
        target: ResourceKey<K>,
        limit: Option<usize>,
    ) -> BoxFuture<'static, Result<Vec<V>, ResourceError>> {
        let limit = limit.unwrap_or(self.inner.config.page_size);
        let (has_next_page, offset) = {
            let state = self.state();
            match state.page_info(&target) {
                Some(info) => (info.has_next_page(), info.next_page_offset()),
                None => (true, 0),
            }
        };

        if !has_next_page {
            return future::ready(Ok(Vec::new())).boxed();
        }
        self.load(offset_page_key(target, offset, limit))
    }

    /// Registers a consumer of `key`, generating an id unless one is given.
    pub fn use_key(&self, key: &ResourceKey<K>, id: Option<UseId>) -> Result<UseId, ResourceError> {
        self.check_key(key)?;
        let id = id.unwrap_or_default();

        let is_in_use = {
            let mut state = self.state();
            let targets = state.expand(key)?;
            let mut tracker = ResourceUseTracker::new(&mut state.metadata);
            tracker.use_targets(&targets, &id);
            tracker.is_in_use(&targets)
        };

        self.inner.events.used.emit(&UseEvent {
            id: id.clone(),
            key: key.clone(),
            is_in_use,
        });
        Ok(id)
    }

    /// Removes the consumer `id` from `key`.
    pub fn free(&self, key: &ResourceKey<K>, id: &UseId) -> Result<(), ResourceError> {
        self.check_key(key)?;

        let is_in_use = {
            let mut state = self.state();
            let targets = state.expand(key)?;
            let mut tracker = ResourceUseTracker::new(&mut state.metadata);
            tracker.free_targets(&targets, id);
            tracker.is_in_use(&targets)
        };

        self.inner.events.used.emit(&UseEvent {
            id: id.clone(),
            key: key.clone(),
            is_in_use,
        });
        Ok(())
    }

    pub fn is_in_use(&self, key: &ResourceKey<K>) -> Result<bool, KeyError> {
        let mut state = self.state();
        let targets = state.expand(key)?;
        Ok(ResourceUseTracker::new(&mut state.metadata).is_in_use(&targets))
    }

    /// Returns whether any entry of the resource has a consumer.
    pub fn is_resource_in_use(&self) -> bool {
        ResourceUseTracker::new(&mut self.state().metadata).is_resource_in_use()
    }

    pub fn has_use_id(&self, id: &UseId) -> bool {
        ResourceUseTracker::new(&mut self.state().metadata).has_use_id(id)
    }

    pub fn events(&self) -> &ResourceEvents<K> {
        &self.inner.events
    }

    pub fn on_data_outdated(&self) -> &Subscribers<ResourceKey<K>> {
        &self.inner.events.outdated
    }

    pub fn on_item_delete(&self) -> &Subscribers<ResourceKey<K>> {
        &self.inner.events.deleted
    }

    pub fn on_data_update(&self) -> &Subscribers<ResourceKey<K>> {
        &self.inner.events.updated
    }

    pub fn on_data_error(&self) -> &Subscribers<DataError<K>> {
        &self.inner.events.error
    }

    pub fn on_use(&self) -> &Subscribers<UseEvent<K>> {
        &self.inner.events.used
    }
}
