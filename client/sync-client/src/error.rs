use realtime_link::LinkError;
use resource_cache::CacheError;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl SyncError {
    /// Returns whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Config(_) | SyncError::InvalidInput(_) => false,
            SyncError::Cache(e) => e.is_retryable(),
            SyncError::Link(e) => e.is_retryable(),
        }
    }
}
