use std::collections::BTreeSet;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::LoadError;
use crate::key::{Key, ResourceKey};
use crate::pagination::{self, OFFSET_PAGE};

/// Fetches entries of a resource from their source of truth.
pub trait ResourceLoader<K: Key, V>: Send + Sync + 'static {
    /// Loads the entries addressed by `request.key`.
    ///
    /// The key is passed as requested, so aliases arrive unresolved. For an
    /// [`OFFSET_PAGE`] alias the returned entries have to be in list order.
    ///
    /// This is called synchronously when a load starts. The returned future must not borrow from
    /// the loader, and the loader must not call back into the resource before returning it.
    fn load(&self, request: LoadRequest<K>) -> BoxFuture<'static, Result<Vec<(K, V)>, LoadError>>;

    /// Rejects malformed keys before they reach the store or the loader.
    fn validate_key(&self, _key: &K) -> bool {
        true
    }

    /// Compares keys when deduplicating loads.
    fn is_key_equal(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// A request to a [`ResourceLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest<K> {
    pub key: ResourceKey<K>,
    /// Optional parts of the entries to load along with them.
    pub includes: BTreeSet<String>,
    /// The caller asked to bypass any caching between the loader and the source.
    pub refresh: bool,
}

impl<K> LoadRequest<K> {
    /// Returns `(offset, limit)` if this requests a page of another key.
    pub fn page(&self) -> Option<(usize, usize)> {
        self.key
            .as_alias()
            .filter(|alias| alias.is(OFFSET_PAGE))
            .and_then(|alias| pagination::page_window(alias).ok())
    }

    /// Returns the key a page is requested from.
    pub fn page_target(&self) -> Option<&ResourceKey<K>> {
        self.key
            .as_alias()
            .filter(|alias| alias.is(OFFSET_PAGE))
            .and_then(|alias| pagination::page_target(alias).ok())
    }

    pub fn has_include(&self, include: &str) -> bool {
        self.includes.contains(include)
    }
}

/// A [`ResourceLoader`] backed by a closure, see [`loader_fn`].
#[derive(Clone)]
pub struct FnLoader<F> {
    f: F,
}

/// Creates a loader from a closure returning the load future.
pub fn loader_fn<F>(f: F) -> FnLoader<F> {
    FnLoader { f }
}

impl<K, V, F, Fut> ResourceLoader<K, V> for FnLoader<F>
where
    K: Key,
    F: Fn(LoadRequest<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<(K, V)>, LoadError>> + Send + 'static,
{
    fn load(&self, request: LoadRequest<K>) -> BoxFuture<'static, Result<Vec<(K, V)>, LoadError>> {
        (self.f)(request).boxed()
    }
}
