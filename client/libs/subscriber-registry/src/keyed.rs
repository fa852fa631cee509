use crate::{Registry, Subscription};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// One [`Registry`] per key (cache key, message type, ...).
///
/// Registries are created on first subscription. Keys whose subscribers have
/// all gone away are pruned on the next subscription.
pub struct KeyedRegistry<K, E> {
    inner: Arc<RwLock<HashMap<K, Registry<E>>>>,
}

impl<K, E> Clone for KeyedRegistry<K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, E> Default for KeyedRegistry<K, E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, E> KeyedRegistry<K, E>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    E: 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber for `key`
    pub fn subscribe<F>(&self, key: K, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut guard = self.inner.write();

        let before = guard.len();
        guard.retain(|_, registry| !registry.is_empty());
        if guard.len() != before {
            tracing::trace!(pruned = before - guard.len(), "Pruned empty subscriber keys");
        }

        guard.entry(key).or_default().subscribe(callback)
    }

    /// Notify every subscriber of `key`. Returns the number of callbacks invoked.
    pub fn notify(&self, key: &K, event: &E) -> usize {
        // Clone the registry handle so callbacks run without the map lock.
        let registry = match self.inner.read().get(key) {
            Some(registry) => registry.clone(),
            None => return 0,
        };
        registry.notify_all(event)
    }

    /// Get subscriber count for a key (for debugging/metrics)
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.inner.read().get(key).map(|r| r.len()).unwrap_or(0)
    }
}
