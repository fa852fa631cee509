//! Subscriber registries for client-side state fan-out
//!
//! Every piece of shared state in the sync client (cache entries, connection
//! state, routed wire messages, typing sets) publishes through a [`Registry`].
//!
//! # Dispatch semantics
//!
//! - Callbacks run synchronously, in registration order.
//! - A subscriber removed while a dispatch is running is not invoked for the
//!   remainder of that dispatch.
//! - A subscriber added while a dispatch is running first sees the next event.
//! - Callbacks run without any registry lock held, so they may subscribe or
//!   unsubscribe freely.
//!
//! # Example
//!
//! ```
//! use subscriber_registry::Registry;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let registry: Registry<u32> = Registry::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//!
//! let seen_clone = seen.clone();
//! let subscription = registry.subscribe(move |value| {
//!     seen_clone.fetch_add(*value as usize, Ordering::SeqCst);
//! });
//!
//! registry.notify_all(&2);
//! subscription.unsubscribe();
//! registry.notify_all(&5);
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//! ```

mod keyed;
mod subscription;

pub use keyed::KeyedRegistry;
pub use subscription::Subscription;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Callback invoked with each published event
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Unique identifier for a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber entry with ID, liveness flag and callback
struct Subscriber<E> {
    id: SubscriberId,
    active: Arc<AtomicBool>,
    callback: Callback<E>,
}

pub(crate) struct Shared<E> {
    subscribers: RwLock<Vec<Subscriber<E>>>,
}

/// Type-erased removal handle used by [`Subscription`]
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, id: SubscriberId) -> bool;
    fn is_registered(&self, id: SubscriberId) -> bool;
}

impl<E> Detach for Shared<E> {
    fn is_registered(&self, id: SubscriberId) -> bool {
        self.subscribers.read().iter().any(|s| s.id == id)
    }

    fn detach(&self, id: SubscriberId) -> bool {
        let mut guard = self.subscribers.write();
        let Some(position) = guard.iter().position(|s| s.id == id) else {
            return false;
        };

        let removed = guard.remove(position);
        removed.active.store(false, Ordering::SeqCst);

        tracing::trace!(
            subscriber_id = %id,
            remaining = guard.len(),
            "Removed subscriber"
        );
        true
    }
}

/// Ordered registry of `(id, callback)` pairs
pub struct Registry<E> {
    inner: Arc<Shared<E>>,
}

impl<E> Clone for Registry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Shared {
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }
}

impl<E: 'static> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; it stays registered until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let subscriber = Subscriber {
            id,
            active: Arc::new(AtomicBool::new(true)),
            callback: Arc::new(callback),
        };

        let mut guard = self.inner.subscribers.write();
        guard.push(subscriber);

        tracing::trace!(
            subscriber_id = %id,
            total = guard.len(),
            "Added subscriber"
        );
        drop(guard);

        let shared: Arc<dyn Detach> = self.inner.clone();
        Subscription::new(id, Arc::downgrade(&shared))
    }

    /// Remove a subscriber by ID. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.detach(id)
    }

    /// Invoke every current subscriber with `event`, in registration order.
    ///
    /// Returns the number of callbacks invoked.
    pub fn notify_all(&self, event: &E) -> usize {
        let snapshot: Vec<(Arc<AtomicBool>, Callback<E>)> = {
            let guard = self.inner.subscribers.read();
            guard
                .iter()
                .map(|s| (Arc::clone(&s.active), Arc::clone(&s.callback)))
                .collect()
        };

        let mut delivered = 0;
        for (active, callback) in snapshot {
            if !active.load(Ordering::SeqCst) {
                continue;
            }
            callback(event);
            delivered += 1;
        }
        delivered
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.is_registered(id)
    }

    pub fn len(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.subscribers.read().is_empty()
    }
}
