//! Per-scope token cache in front of a [`TokenCredential`].

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::sdk::credentials::{AccessToken, TokenCredential};

/// Caches tokens by scope and refreshes them shortly before expiry.
#[derive(Debug, Clone)]
pub struct AuthManager {
    credential: Arc<dyn TokenCredential>,
    cache: Arc<DashMap<String, AccessToken>>,
}

impl AuthManager {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            credential,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Return a token for `scope`, hitting the credential only when needed.
    pub async fn acquire_token(&self, scope: &str) -> Result<AccessToken> {
        if let Some(cached) = self.cache.get(scope) {
            if !cached.expires_soon() {
                return Ok(cached.clone());
            }
        }

        debug!("Acquiring token for {}", scope);
        let token = self.credential.get_token(scope).await?;
        self.cache.insert(scope.to_string(), token.clone());
        Ok(token)
    }

    /// Drop all cached tokens.
    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingCredential {
        calls: AtomicUsize,
        lifetime_secs: i64,
    }

    #[async_trait]
    impl TokenCredential for CountingCredential {
        async fn get_token(&self, scope: &str) -> Result<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::new(
                format!("{}-{}", scope, n),
                Utc::now() + Duration::seconds(self.lifetime_secs),
            ))
        }
    }

    #[tokio::test]
    async fn test_token_is_cached_per_scope() {
        let cred = Arc::new(CountingCredential {
            lifetime_secs: 3600,
            ..Default::default()
        });
        let auth = AuthManager::new(cred.clone());

        let a1 = auth.acquire_token("a").await.unwrap();
        let a2 = auth.acquire_token("a").await.unwrap();
        let b = auth.acquire_token("b").await.unwrap();

        assert_eq!(a1.token, a2.token);
        assert_ne!(a1.token, b.token);
        assert_eq!(cred.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        let cred = Arc::new(CountingCredential {
            lifetime_secs: 10,
            ..Default::default()
        });
        let auth = AuthManager::new(cred.clone());

        auth.acquire_token("a").await.unwrap();
        auth.acquire_token("a").await.unwrap();

        assert_eq!(cred.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let cred = Arc::new(CountingCredential {
            lifetime_secs: 3600,
            ..Default::default()
        });
        let auth = AuthManager::new(cred.clone());

        auth.acquire_token("a").await.unwrap();
        auth.clear();
        auth.acquire_token("a").await.unwrap();

        assert_eq!(cred.calls.load(Ordering::SeqCst), 2);
    }
}
