//! Synchronous change notifications of a resource.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::LoadError;
use crate::key::ResourceKey;
use crate::use_tracker::UseEvent;

/// Returned by [`Subscribers::subscribe`], used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Handlers<T> = Mutex<Vec<(SubscriptionId, Handler<T>)>>;

/// Unsubscribes its handler when dropped.
///
/// Returned by [`Subscribers::subscribe_scoped`]. Dropping it after the [`Subscribers`] are gone
/// does nothing.
#[must_use = "the handler is removed as soon as the subscription is dropped"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// A list of handlers for one kind of event.
///
/// Handlers run synchronously on the thread emitting the event, in registration order. They run
/// on a snapshot of the handler list, so a handler may subscribe or unsubscribe handlers, and may
/// call back into the resource that emitted the event.
pub struct Subscribers<T> {
    next_id: AtomicU64,
    handlers: Arc<Handlers<T>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Subscribers<T> {
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Like [`subscribe`](Self::subscribe), but the handler is removed once the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe_scoped<F>(&self, handler: F) -> Subscription
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.subscribe(handler);
        let handlers: Weak<Handlers<T>> = Arc::downgrade(&self.handlers);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(handlers) = handlers.upgrade() {
                    handlers.lock().retain(|(handler_id, _)| *handler_id != id);
                }
            })),
        }
    }

    /// Removes a handler. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let len = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != len
    }

    pub fn emit(&self, event: &T) {
        let handlers: Vec<_> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A failed load, as emitted on [`ResourceEvents::error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataError<K> {
    pub key: ResourceKey<K>,
    pub error: LoadError,
}

/// All events a resource emits.
pub struct ResourceEvents<K> {
    /// Keys were marked outdated, either explicitly or through a synced resource.
    pub outdated: Subscribers<ResourceKey<K>>,
    /// Keys were deleted.
    pub deleted: Subscribers<ResourceKey<K>>,
    /// Data was loaded or set.
    pub updated: Subscribers<ResourceKey<K>>,
    pub error: Subscribers<DataError<K>>,
    pub used: Subscribers<UseEvent<K>>,
}

impl<K> Default for ResourceEvents<K> {
    fn default() -> Self {
        Self {
            outdated: Subscribers::default(),
            deleted: Subscribers::default(),
            updated: Subscribers::default(),
            error: Subscribers::default(),
            used: Subscribers::default(),
        }
    }
}

impl<K> fmt::Debug for ResourceEvents<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEvents")
            .field("outdated", &self.outdated)
            .field("deleted", &self.deleted)
            .field("updated", &self.updated)
            .field("error", &self.error)
            .field("used", &self.used)
            .finish()
    }
}
