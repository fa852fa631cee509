//! Cache error types

use resilience::TimeoutError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the resource cache.
///
/// `Clone` because one fetch outcome fans out to every caller awaiting it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Mutation rejected: {0}")]
    Mutation(String),

    #[error("Fetch task ended without a result")]
    Cancelled,
}

impl CacheError {
    /// Transient failures worth retrying on the next read
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CacheError::Fetch(_) | CacheError::Timeout(_) | CacheError::Cancelled
        )
    }
}

impl From<TimeoutError> for CacheError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Elapsed(duration) => CacheError::Timeout(duration),
            TimeoutError::OperationFailed(message) => CacheError::Fetch(message),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
