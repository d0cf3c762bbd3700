//! Event handlers: the push side of delivery.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// Error a handler may return. It is logged and counted, never
/// propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What every handler invocation resolves to.
pub type HandlerResult = Result<(), HandlerError>;

type HandlerFn = dyn Fn(Value) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A callback invoked with the payload of every envelope on the channel
/// it is registered for.
///
/// Handlers are cheap to clone; clones share the closure and compare
/// equal under [`Handler::same`], which is how
/// [`HandlerRegistry::unregister`](crate::HandlerRegistry::unregister)
/// finds them.
///
/// # Example
///
/// ```rust
/// use gmgn_dispatch::Handler;
///
/// // An async handler...
/// let log_pool = Handler::new(|payload| async move {
///     println!("new pool: {payload}");
///     Ok(())
/// });
///
/// // ...and a plain closure, run inline.
/// let count = Handler::sync(|_payload| Ok(()));
/// # let _ = (log_pool, count);
/// ```
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Wraps an async callback.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self(Arc::new(move |payload| f(payload).boxed()))
    }

    /// Wraps a synchronous callback into an immediately ready future.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value) -> HandlerResult + Send + Sync + 'static,
    {
        Self(Arc::new(move |payload| futures_util::future::ready(f(payload)).boxed()))
    }

    /// Invokes the handler with `payload`.
    pub fn call(&self, payload: Value) -> BoxFuture<'static, HandlerResult> {
        (*self.0)(payload)
    }

    /// Whether `self` and `other` are clones of the same handler.
    pub fn same(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_call_async_handler_receives_payload() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = seen.clone();
        let handler = Handler::new(move |payload| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(payload);
                Ok(())
            }
        });

        handler.call(json!({"pool": "0x1"})).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(json!({"pool": "0x1"})));
    }

    #[tokio::test]
    async fn test_call_sync_handler_error_is_returned() {
        let handler = Handler::sync(|_| Err("boom".into()));

        let result = handler.call(Value::Null).await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[tokio::test]
    async fn test_call_sync_handler_runs_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = Handler::sync(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        handler.call(Value::Null).await.unwrap();
        handler.call(Value::Null).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_same_distinguishes_clones_from_lookalikes() {
        let a = Handler::sync(|_| Ok(()));
        let b = Handler::sync(|_| Ok(()));

        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }
}
