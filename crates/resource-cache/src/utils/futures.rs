use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::LoadError;

/// Execute a callback on dropping of the container type.
///
/// The callback must not panic under any circumstance. Since it is called while dropping an item,
/// this might result in aborting program execution.
pub struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    /// Creates a new `CallOnDrop`.
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> CallOnDrop {
        CallOnDrop {
            f: Some(Box::new(f)),
        }
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// Fails a load with [`LoadError::Timeout`] if it does not finish within `timeout`.
///
/// Without a timeout the load is returned unchanged.
pub fn with_load_timeout<T>(
    future: BoxFuture<'static, Result<T, LoadError>>,
    timeout: Option<Duration>,
) -> BoxFuture<'static, Result<T, LoadError>>
where
    T: Send + 'static,
{
    let Some(timeout) = timeout else {
        return future;
    };

    async move {
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_elapsed) => Err(LoadError::Timeout(timeout)),
        }
    }
    .boxed()
}
