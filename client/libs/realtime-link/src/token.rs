//! Access-token acquisition for the realtime handshake

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("no token available: {0}")]
    Unavailable(String),

    #[error("token provider failed: {0}")]
    Provider(String),
}

/// Source of bearer tokens, asked once per connection attempt
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, TokenError>;
}

#[async_trait]
impl<P: TokenProvider + ?Sized> TokenProvider for Arc<P> {
    async fn token(&self) -> Result<String, TokenError> {
        (**self).token().await
    }
}

/// Fixed token, for tests and service accounts
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, TokenError> {
        if self.token.is_empty() {
            return Err(TokenError::Unavailable("static token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}

/// Tries each provider in order and returns the first token obtained.
///
/// A session-scoped token source and a user-scoped one, for example, are
/// chained here rather than at every call site.
pub struct FallbackTokenProvider {
    providers: Vec<Arc<dyn TokenProvider>>,
}

impl FallbackTokenProvider {
    pub fn new(providers: Vec<Arc<dyn TokenProvider>>) -> Self {
        Self { providers }
    }

    pub fn then(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.providers.push(provider);
        self
    }
}

#[async_trait]
impl TokenProvider for FallbackTokenProvider {
    async fn token(&self) -> Result<String, TokenError> {
        let mut failures = Vec::with_capacity(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            match provider.token().await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    tracing::debug!(provider = index, error = %e, "Token provider failed, trying next");
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            return Err(TokenError::Unavailable("no token providers configured".to_string()));
        }
        Err(TokenError::Unavailable(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    struct Failing(&'static str);

    #[async_trait]
    impl TokenProvider for Failing {
        async fn token(&self) -> Result<String, TokenError> {
            Err(TokenError::Provider(self.0.to_string()))
        }
    }

    #[tokio::test]
    async fn test_static_provider() {
        let token = assert_ok!(StaticTokenProvider::new("abc").token().await);
        assert_eq!(token, "abc");
        assert_err!(StaticTokenProvider::new("").token().await);
    }

    #[tokio::test]
    async fn test_fallback_uses_first_success() {
        let provider = FallbackTokenProvider::new(vec![Arc::new(Failing("session expired"))])
            .then(Arc::new(StaticTokenProvider::new("user-token")))
            .then(Arc::new(StaticTokenProvider::new("unused")));

        assert_eq!(provider.token().await.unwrap(), "user-token");
    }

    #[tokio::test]
    async fn test_fallback_reports_every_failure() {
        let provider = FallbackTokenProvider::new(vec![
            Arc::new(Failing("session expired")),
            Arc::new(Failing("no user")),
        ]);

        match provider.token().await {
            Err(TokenError::Unavailable(message)) => {
                assert!(message.contains("session expired"));
                assert!(message.contains("no user"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_fallback_chain() {
        let provider = FallbackTokenProvider::new(Vec::new());
        assert_err!(provider.token().await);
    }
}
