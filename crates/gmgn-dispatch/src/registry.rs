//! Per-channel handler lists.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::Handler;

/// Maps channel names to the handlers registered for them.
///
/// Invocation order is registration order. The same handler may be
/// registered more than once and then runs once per registration.
///
/// Locks are held only for the duration of one call. The dispatcher
/// takes a [`snapshot`](HandlerRegistry::snapshot) and releases the lock
/// before running anything, so a handler may register or unregister
/// handlers without deadlocking.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `channel`.
    pub fn register(&self, channel: impl Into<String>, handler: Handler) {
        let channel = channel.into();
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let list = handlers.entry(channel.clone()).or_default();
        list.push(handler);
        tracing::debug!(%channel, count = list.len(), "handler registered");
    }

    /// Removes the first registration of `handler` for `channel`, or
    /// every handler for `channel` when `handler` is `None`.
    ///
    /// Does nothing if there is no match.
    pub fn unregister(&self, channel: &str, handler: Option<&Handler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(channel) else {
            return;
        };

        match handler {
            None => list.clear(),
            Some(target) => {
                if let Some(pos) = list.iter().position(|h| h.same(target)) {
                    list.remove(pos);
                }
            }
        }
        if list.is_empty() {
            handlers.remove(channel);
        }
        tracing::debug!(%channel, "handler unregistered");
    }

    /// A copy of the handlers for `channel`, in invocation order.
    pub fn snapshot(&self, channel: &str) -> Vec<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of handlers registered for `channel`.
    pub fn count(&self, channel: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        Handler::sync(|_| Ok(()))
    }

    #[test]
    fn test_register_preserves_order() {
        let reg = HandlerRegistry::new();
        let (a, b, c) = (noop(), noop(), noop());
        reg.register("new_pool_info", a.clone());
        reg.register("new_pool_info", b.clone());
        reg.register("new_pool_info", c.clone());

        let list = reg.snapshot("new_pool_info");

        assert_eq!(list.len(), 3);
        assert!(list[0].same(&a));
        assert!(list[1].same(&b));
        assert!(list[2].same(&c));
    }

    #[test]
    fn test_register_duplicate_is_kept() {
        let reg = HandlerRegistry::new();
        let a = noop();
        reg.register("chain_stat", a.clone());
        reg.register("chain_stat", a.clone());

        assert_eq!(reg.count("chain_stat"), 2);
    }

    #[test]
    fn test_unregister_removes_first_match_only() {
        let reg = HandlerRegistry::new();
        let (a, b) = (noop(), noop());
        reg.register("chain_stat", a.clone());
        reg.register("chain_stat", b.clone());
        reg.register("chain_stat", a.clone());

        reg.unregister("chain_stat", Some(&a));

        let list = reg.snapshot("chain_stat");
        assert_eq!(list.len(), 2);
        assert!(list[0].same(&b));
        assert!(list[1].same(&a));
    }

    #[test]
    fn test_unregister_none_removes_all() {
        let reg = HandlerRegistry::new();
        reg.register("chain_stat", noop());
        reg.register("chain_stat", noop());
        reg.register("new_pool_info", noop());

        reg.unregister("chain_stat", None);

        assert_eq!(reg.count("chain_stat"), 0);
        assert_eq!(reg.count("new_pool_info"), 1);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let reg = HandlerRegistry::new();
        let a = noop();
        reg.register("chain_stat", a.clone());

        reg.unregister("new_pool_info", Some(&a));
        reg.unregister("chain_stat", Some(&noop()));

        assert_eq!(reg.count("chain_stat"), 1);
    }

    #[test]
    fn test_snapshot_unknown_channel_is_empty() {
        let reg = HandlerRegistry::new();
        assert!(reg.snapshot("unknown").is_empty());
    }
}
