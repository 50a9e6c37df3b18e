use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use resource_cache::config::ResourceConfig;
use resource_cache::{CachedMapResource, CachedResource, LoadError, LoadRequest, ResourceKey, ResourceLoader};

pub use resource_cache_test::{CallCounter, Gate, setup};

/// The include that makes [`MockLoader`] append details to its values.
pub const DETAILS: &str = "details";

/// A resource of connection names by id.
pub type Connections = CachedMapResource<u32, String, MockLoader>;

/// A loader serving items from memory.
///
/// The response is computed when the loader is called, so changes to the items after that are
/// only visible to later loads.
#[derive(Clone, Default)]
pub struct MockLoader {
    items: Arc<Mutex<BTreeMap<u32, String>>>,
    calls: CallCounter,
    requests: Arc<Mutex<Vec<LoadRequest<u32>>>>,
    held: Arc<Mutex<Option<Gate>>>,
    failure: Arc<Mutex<Option<LoadError>>>,
}

impl MockLoader {
    pub fn new<'a>(items: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        let loader = Self::default();
        for (key, value) in items {
            loader.set_item(key, value);
        }
        loader
    }

    /// Creates a loader serving `count` items named `item-{key}`.
    pub fn with_count(count: u32) -> Self {
        let loader = Self::default();
        for key in 0..count {
            loader.set_item(key + 1, &format!("item-{}", key + 1));
        }
        loader
    }

    pub fn set_item(&self, key: u32, value: &str) {
        self.items.lock().unwrap().insert(key, value.to_owned());
    }

    pub fn remove_item(&self, key: u32) {
        self.items.lock().unwrap().remove(&key);
    }

    /// Fails all following loads with `error`, or lets them succeed again for `None`.
    pub fn fail_with(&self, error: Option<LoadError>) {
        *self.failure.lock().unwrap() = error;
    }

    /// Holds back the result of the next load until the returned gate is opened.
    pub fn hold_next(&self) -> Gate {
        let gate = Gate::new();
        *self.held.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn requests(&self) -> Vec<LoadRequest<u32>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn resource(&self) -> Connections {
        self.resource_with_config(ResourceConfig::default())
    }

    pub fn resource_with_config(&self, config: ResourceConfig) -> Connections {
        CachedResource::new("connections", self.clone(), config)
    }

    fn respond(&self, request: &LoadRequest<u32>) -> Result<Vec<(u32, String)>, LoadError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        let items = self.items.lock().unwrap();
        let keys: Vec<u32> = match &request.key {
            ResourceKey::Flat(key) => vec![*key],
            ResourceKey::List(keys) => keys.clone(),
            ResourceKey::Alias(_) => match request.page() {
                Some((offset, limit)) => items.keys().skip(offset).take(limit).copied().collect(),
                None => items.keys().copied().collect(),
            },
        };

        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let value = items.get(&key)?;
                let value = match request.has_include(DETAILS) {
                    true => format!("{value} (details)"),
                    false => value.clone(),
                };
                Some((key, value))
            })
            .collect())
    }
}

impl ResourceLoader<u32, String> for MockLoader {
    fn load(&self, request: LoadRequest<u32>) -> BoxFuture<'static, Result<Vec<(u32, String)>, LoadError>> {
        self.calls.incr();
        self.requests.lock().unwrap().push(request.clone());

        let response = self.respond(&request);
        let gate = self.held.lock().unwrap().take();
        async move {
            if let Some(gate) = gate {
                gate.wait().await;
            }
            response
        }
        .boxed()
    }

    /// Ids start at 1.
    fn validate_key(&self, key: &u32) -> bool {
        *key != 0
    }
}

/// Collects all events emitted to a subscriber.
pub fn collect<T: Clone + Send + 'static>(
    subscribers: &resource_cache::Subscribers<T>,
) -> Arc<Mutex<Vec<T>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    subscribers.subscribe(move |event: &T| sink.lock().unwrap().push(event.clone()));
    seen
}
