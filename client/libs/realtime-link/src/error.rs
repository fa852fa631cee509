//! Link error types

use crate::state::ConnectionPhase;
use thiserror::Error;

pub type LinkResult<T> = Result<T, LinkError>;

/// Failure class, used to pick between retry and surfacing to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failures; the connection manager retries with backoff
    Network,
    /// Token acquisition failures; never retried automatically
    Auth,
    /// Malformed frames; dropped and logged
    Protocol,
    /// Operation invalid in the current connection phase
    State,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cannot {operation} while {phase}")]
    State {
        operation: &'static str,
        phase: ConnectionPhase,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Network(_) => ErrorKind::Network,
            LinkError::Auth(_) => ErrorKind::Auth,
            LinkError::Protocol(_) | LinkError::Serialization(_) => ErrorKind::Protocol,
            LinkError::State { .. } => ErrorKind::State,
        }
    }

    /// Returns whether the connection manager retries after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        LinkError::Network(err.to_string())
    }
}
