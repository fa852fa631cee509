use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of one cached resource, as seen by subscribers.
///
/// Only the cache mutates entries; consumers receive clones.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: Option<Arc<T>>,
    pub last_updated_at: Option<Instant>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Set by `invalidate`; forces the next read to fetch regardless of TTL
    pub is_stale: bool,
    /// Number of state transitions applied to this entry
    pub version: u64,
}

// Manual impl: cloning shares `data`, so `T: Clone` is not required.
impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            data: self.data.clone(),
            last_updated_at: self.last_updated_at,
            is_loading: self.is_loading,
            error: self.error.clone(),
            is_stale: self.is_stale,
            version: self.version,
        }
    }
}

/// What a consumer should render for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Nothing requested yet
    Empty,
    /// First load in progress, no data yet
    Loading,
    /// Data available and the last refresh succeeded
    Ready,
    /// Last refresh failed but earlier data is still shown
    Degraded,
    /// No data has ever been obtained and the last attempt failed
    Failed,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: None,
            last_updated_at: None,
            is_loading: false,
            error: None,
            is_stale: false,
            version: 0,
        }
    }

    /// Fresh when not invalidated and updated less than `ttl` ago
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        if self.is_stale || self.data.is_none() {
            return false;
        }
        match self.last_updated_at {
            Some(updated) => now.saturating_duration_since(updated) < ttl,
            None => false,
        }
    }

    pub fn status(&self) -> EntryStatus {
        match (&self.data, &self.error) {
            (Some(_), None) => EntryStatus::Ready,
            (Some(_), Some(_)) => EntryStatus::Degraded,
            (None, Some(_)) if !self.is_loading => EntryStatus::Failed,
            (None, _) if self.is_loading => EntryStatus::Loading,
            (None, _) => EntryStatus::Empty,
        }
    }
}
