//! Shared resource cache for client-side sync
//!
//! Keeps many independent consumers in agreement about one piece of server
//! state per key while issuing as few requests as possible:
//! - Single-flight fetches (concurrent readers of a key share one request)
//! - TTL freshness with explicit invalidation
//! - Subscriber fan-out on every state transition
//! - Stale-while-error (a failed refresh keeps the last good data)
//! - Optimistic updates reconciled by refetch on rejection
//! - Sequence-guarded writes (a slow, older fetch never overwrites newer data)

mod entry;
mod error;
mod metrics;
mod resource;

pub use entry::{CacheEntry, EntryStatus};
pub use error::{CacheError, CacheResult};
pub use metrics::CacheMetrics;
pub use resource::{BoxFetcher, Resource};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subscriber_registry::{KeyedRegistry, Subscription};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default TTL values
pub mod ttl {
    use std::time::Duration;

    pub const NOTIFICATIONS: Duration = Duration::from_secs(15);
    pub const PROFILE: Duration = Duration::from_secs(60);
}

type FetchOutcome<T> = CacheResult<Arc<T>>;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL used by [`Resource`] handles that don't set their own
    pub default_ttl: Duration,
    /// Upper bound on a single fetch (`None` = wait indefinitely)
    pub fetch_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: ttl::NOTIFICATIONS,
            fetch_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// The one fetch currently registered for a key
struct InFlightFetch<T> {
    seq: u64,
    outcome: watch::Receiver<Option<FetchOutcome<T>>>,
}

impl<T> InFlightFetch<T> {
    /// False once the fetch task is gone without settling
    fn is_alive(&self) -> bool {
        self.outcome.has_changed().is_ok()
    }
}

struct Slot<T> {
    entry: CacheEntry<T>,
    /// Last sequence number handed out (fetches and direct writes share it)
    next_seq: u64,
    /// Sequence number of the write currently reflected in `entry.data`
    applied_seq: u64,
    /// Fetches issued at or below this sequence started before the last
    /// `invalidate` and cannot restore freshness
    invalidated_seq: u64,
    in_flight: Option<InFlightFetch<T>>,
}

impl<T> Slot<T> {
    fn new(key: &str) -> Self {
        Self {
            entry: CacheEntry::new(key),
            next_seq: 0,
            applied_seq: 0,
            invalidated_seq: 0,
            in_flight: None,
        }
    }

    fn issue_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn touch(&mut self) -> CacheEntry<T> {
        self.entry.version += 1;
        self.entry.clone()
    }
}

struct Inner<T> {
    name: String,
    config: CacheConfig,
    slots: Mutex<HashMap<String, Slot<T>>>,
    subscribers: KeyedRegistry<String, CacheEntry<T>>,
    metrics: CacheMetrics,
}

/// Single-flight TTL cache with subscriber fan-out.
///
/// Cloning yields another handle to the same cache.
pub struct ResourceCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

enum ReadPlan<T> {
    Fresh(Arc<T>),
    Join(watch::Receiver<Option<FetchOutcome<T>>>),
    Start {
        seq: u64,
        sender: watch::Sender<Option<FetchOutcome<T>>>,
        receiver: watch::Receiver<Option<FetchOutcome<T>>>,
        snapshot: CacheEntry<T>,
    },
}

impl<T: Send + Sync + 'static> ResourceCache<T> {
    /// Create a cache; `name` labels logs and metrics (e.g. "notifications")
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        let name = name.into();
        info!(resource = %name, ?config, "Initializing resource cache");

        Self {
            inner: Arc::new(Inner {
                metrics: CacheMetrics::new(name.clone()),
                name,
                config,
                slots: Mutex::new(HashMap::new()),
                subscribers: KeyedRegistry::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Read `key`, fetching only when the entry is missing, expired or invalidated.
    ///
    /// Concurrent callers on a key that needs fetching share a single fetcher
    /// invocation and all receive the same result.
    pub async fn get<F, Fut, E>(&self, key: &str, fetcher: F, ttl: Duration) -> CacheResult<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.load(key, fetcher, Some(ttl)).await
    }

    /// Forced read: ignores TTL, but still joins a fetch already in flight.
    pub async fn refresh<F, Fut, E>(&self, key: &str, fetcher: F) -> CacheResult<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.load(key, fetcher, None).await
    }

    async fn load<F, Fut, E>(&self, key: &str, fetcher: F, ttl: Option<Duration>) -> CacheResult<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let mut receiver = match self.plan_read(key, ttl) {
            ReadPlan::Fresh(data) => return Ok(data),
            ReadPlan::Join(receiver) => receiver,
            ReadPlan::Start {
                seq,
                sender,
                receiver,
                snapshot,
            } => {
                self.inner.subscribers.notify(&key.to_string(), &snapshot);
                self.spawn_fetch(key, seq, sender, fetcher());
                receiver
            }
        };

        let outcome = match receiver.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(CacheError::Cancelled))
    }

    fn plan_read(&self, key: &str, ttl: Option<Duration>) -> ReadPlan<T> {
        let mut slots = self.inner.slots.lock();
        let slot = slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(key));

        if let Some(ttl) = ttl {
            if slot.entry.is_fresh(ttl, Instant::now()) {
                if let Some(data) = &slot.entry.data {
                    debug!(resource = %self.inner.name, key = %key, "Cache hit");
                    self.inner.metrics.record_hit();
                    return ReadPlan::Fresh(Arc::clone(data));
                }
            }
        }

        if let Some(in_flight) = slot.in_flight.as_ref().filter(|f| f.is_alive()) {
            debug!(
                resource = %self.inner.name,
                key = %key,
                seq = in_flight.seq,
                "Joining in-flight fetch"
            );
            self.inner.metrics.record_joined();
            return ReadPlan::Join(in_flight.outcome.clone());
        }

        let seq = slot.issue_seq();
        let (sender, receiver) = watch::channel(None);
        slot.in_flight = Some(InFlightFetch {
            seq,
            outcome: receiver.clone(),
        });
        slot.entry.is_loading = true;

        debug!(resource = %self.inner.name, key = %key, seq, "Cache miss, starting fetch");
        self.inner.metrics.record_miss();

        ReadPlan::Start {
            seq,
            sender,
            receiver,
            snapshot: slot.touch(),
        }
    }

    /// Run the fetch on its own task so that no caller (or unsubscribing
    /// consumer) can cancel it for the others.
    fn spawn_fetch<Fut, E>(
        &self,
        key: &str,
        seq: u64,
        sender: watch::Sender<Option<FetchOutcome<T>>>,
        fetch: Fut,
    ) where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let cache = self.clone();
        let key = key.to_string();
        let fetch_timeout = self.inner.config.fetch_timeout;

        tokio::spawn(async move {
            let result = match fetch_timeout {
                Some(limit) => resilience::with_timeout_result(limit, fetch)
                    .await
                    .map_err(CacheError::from),
                None => fetch.await.map_err(|e| CacheError::Fetch(e.to_string())),
            };

            let outcome = cache.settle(&key, seq, result);
            // Nobody waiting is fine; subscribers were notified in settle.
            let _ = sender.send(Some(outcome));
        });
    }

    /// Apply a finished fetch and notify subscribers
    fn settle(&self, key: &str, seq: u64, result: CacheResult<T>) -> FetchOutcome<T> {
        let (snapshot, outcome) = {
            let mut slots = self.inner.slots.lock();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(key));

            if slot.in_flight.as_ref().map(|f| f.seq) == Some(seq) {
                slot.in_flight = None;
            }
            slot.entry.is_loading = slot.in_flight.is_some();
            let superseded = seq <= slot.applied_seq;

            let outcome = match result {
                Ok(value) if superseded => {
                    debug!(
                        resource = %self.inner.name,
                        key = %key,
                        seq,
                        applied_seq = slot.applied_seq,
                        "Discarding fetch result older than current data"
                    );
                    self.inner.metrics.record_discarded();
                    Ok(slot
                        .entry
                        .data
                        .clone()
                        .unwrap_or_else(|| Arc::new(value)))
                }
                Ok(value) => {
                    let data = Arc::new(value);
                    slot.applied_seq = seq;
                    slot.entry.data = Some(Arc::clone(&data));
                    slot.entry.error = None;

                    let predates_invalidation = seq <= slot.invalidated_seq;
                    if !predates_invalidation {
                        slot.entry.last_updated_at = Some(Instant::now());
                        slot.entry.is_stale = false;
                    }

                    debug!(
                        resource = %self.inner.name,
                        key = %key,
                        seq,
                        still_stale = predates_invalidation,
                        "Fetch applied"
                    );
                    self.inner.metrics.record_write();
                    Ok(data)
                }
                Err(err) => {
                    warn!(
                        resource = %self.inner.name,
                        key = %key,
                        seq,
                        error = %err,
                        has_stale_data = slot.entry.data.is_some(),
                        "Fetch failed"
                    );
                    self.inner.metrics.record_error(match err {
                        CacheError::Timeout(_) => "timeout",
                        _ => "fetch",
                    });
                    if !superseded {
                        // Keep the previous data: stale-while-error.
                        slot.entry.error = Some(err.to_string());
                    }
                    Err(err)
                }
            };

            (slot.touch(), outcome)
        };

        self.inner.subscribers.notify(&key.to_string(), &snapshot);
        outcome
    }

    /// Subscribe to state changes for `key`.
    ///
    /// The callback fires once immediately with the current state, then on
    /// every subsequent transition.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry<T>) + Send + Sync + 'static,
    {
        // Deliveries carry the entry version; anything older than what this
        // subscriber has already seen is dropped.
        let delivered = Arc::new(AtomicU64::new(0));
        let callback = Arc::new(move |entry: &CacheEntry<T>| {
            if delivered.fetch_max(entry.version + 1, Ordering::SeqCst) <= entry.version {
                callback(entry);
            }
        });

        let registered = Arc::clone(&callback);
        let (subscription, snapshot) = {
            let mut slots = self.inner.slots.lock();
            let snapshot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(key))
                .entry
                .clone();
            let subscription = self
                .inner
                .subscribers
                .subscribe(key.to_string(), move |entry| registered(entry));
            (subscription, snapshot)
        };
        callback(&snapshot);

        debug!(
            resource = %self.inner.name,
            key = %key,
            subscribers = self.inner.subscribers.subscriber_count(&key.to_string()),
            "Subscriber attached"
        );
        subscription
    }

    /// Drop freshness for `key`: the next read fetches regardless of TTL.
    ///
    /// A fetch already in flight is detached rather than cancelled. Its result
    /// still fills the entry unless a newer write lands first, but the entry
    /// stays stale so the next read fetches again.
    pub fn invalidate(&self, key: &str) {
        let snapshot = {
            let mut slots = self.inner.slots.lock();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(key));
            slot.entry.is_stale = true;
            slot.invalidated_seq = slot.next_seq;
            slot.in_flight = None;
            slot.touch()
        };

        debug!(resource = %self.inner.name, key = %key, "Cache invalidated");
        self.inner.metrics.record_invalidation();
        self.inner.subscribers.notify(&key.to_string(), &snapshot);
    }

    /// Write server-provided data directly (e.g. pushed over the realtime link)
    pub fn set(&self, key: &str, value: T) {
        let snapshot = {
            let mut slots = self.inner.slots.lock();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(key));
            slot.applied_seq = slot.issue_seq();
            slot.entry.data = Some(Arc::new(value));
            slot.entry.last_updated_at = Some(Instant::now());
            slot.entry.error = None;
            slot.entry.is_stale = false;
            slot.touch()
        };

        debug!(resource = %self.inner.name, key = %key, "Cache set");
        self.inner.metrics.record_write();
        self.inner.subscribers.notify(&key.to_string(), &snapshot);
    }

    /// Apply `mutator` locally and notify at once, then run `mutation` against
    /// the server. On rejection the entry is invalidated and refetched with
    /// `fetcher`; the optimistic value is never rolled back by hand.
    pub async fn optimistic_update<M, R, ME, MutFut, F, Fut, E>(
        &self,
        key: &str,
        mutator: M,
        mutation: MutFut,
        fetcher: F,
    ) -> CacheResult<R>
    where
        M: FnOnce(&T) -> T,
        MutFut: Future<Output = Result<R, ME>>,
        ME: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let snapshot = {
            let mut slots = self.inner.slots.lock();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(key));

            match slot.entry.data.as_deref().map(mutator) {
                Some(updated) => {
                    slot.applied_seq = slot.issue_seq();
                    slot.entry.data = Some(Arc::new(updated));
                    Some(slot.touch())
                }
                None => None,
            }
        };

        match snapshot {
            Some(snapshot) => self.inner.subscribers.notify(&key.to_string(), &snapshot),
            None => {
                debug!(
                    resource = %self.inner.name,
                    key = %key,
                    "No cached data to update optimistically"
                );
                0
            }
        };

        match mutation.await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(
                    resource = %self.inner.name,
                    key = %key,
                    error = %err,
                    "Mutation rejected, reconciling with server"
                );
                self.inner.metrics.record_reconcile();
                self.invalidate(key);

                if let Err(refetch_err) = self.refresh(key, fetcher).await {
                    warn!(
                        resource = %self.inner.name,
                        key = %key,
                        error = %refetch_err,
                        "Reconciling refetch failed"
                    );
                }
                Err(CacheError::Mutation(err.to_string()))
            }
        }
    }

    /// Current snapshot for `key` (an empty entry if never requested)
    pub fn entry(&self, key: &str) -> CacheEntry<T> {
        self.inner
            .slots
            .lock()
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_else(|| CacheEntry::new(key))
    }

    /// Whether a fetch is currently registered for `key`
    pub fn is_fetching(&self, key: &str) -> bool {
        self.inner
            .slots
            .lock()
            .get(key)
            .map(|slot| slot.in_flight.is_some())
            .unwrap_or(false)
    }

    /// Get subscriber count for a key (for debugging/metrics)
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.subscribers.subscriber_count(&key.to_string())
    }
}
