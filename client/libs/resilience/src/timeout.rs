/// Deadlines for the client's network edges (token fetch, socket open,
/// REST fetch). Callers map [`TimeoutError`] into their own error types.
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeoutError {
    #[error("deadline of {0:?} elapsed")]
    Elapsed(Duration),
    #[error("{0}")]
    OperationFailed(String),
}

impl TimeoutError {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, Self::Elapsed(_))
    }
}

/// Bound `future` by `limit`
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(limit, future).await.map_err(|_| TimeoutError::Elapsed(limit))
}

/// Bound a fallible `future` by `limit`. Its own error is kept as a message
/// in [`TimeoutError::OperationFailed`].
pub async fn with_timeout_result<F, T, E>(limit: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_timeout(limit, future)
        .await?
        .map_err(|e| TimeoutError::OperationFailed(e.to_string()))
}
