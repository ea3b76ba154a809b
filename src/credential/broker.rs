//! Gateway credential broker
//!
//! The durable [`TokenStore`] is the only cache. Within one process refreshes
//! are single-flight: the first caller holds `refresh_lock` while fetching,
//! later callers wait on the lock and then re-read the store.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::CredentialError;
use super::provider::IdentityProvider;
use super::store::TokenStore;
use super::token::CachedToken;

pub struct CredentialBroker {
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn IdentityProvider>,
    margin: Duration,
    refresh_lock: Mutex<()>,
}

impl CredentialBroker {
    pub fn new(
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn IdentityProvider>,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            store,
            provider,
            margin: Duration::seconds(refresh_margin_secs),
            refresh_lock: Mutex::new(()),
        }
    }

    /// A token valid for at least the refresh margin
    pub async fn get_token(&self) -> Result<CachedToken, CredentialError> {
        if let Some(token) = self.fresh_stored().await? {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited
        if let Some(token) = self.fresh_stored().await? {
            tracing::debug!("Reusing token refreshed by a concurrent caller");
            return Ok(token);
        }

        self.fetch_and_store().await
    }

    /// Fetch a new token even if the stored one is still fresh
    pub async fn refresh(&self) -> Result<CachedToken, CredentialError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    async fn fresh_stored(&self) -> Result<Option<CachedToken>, CredentialError> {
        let now = Utc::now();
        Ok(self
            .store
            .load()
            .await?
            .filter(|t| t.is_fresh_at(now, self.margin)))
    }

    async fn fetch_and_store(&self) -> Result<CachedToken, CredentialError> {
        let token = self.provider.fetch_token().await?;
        self.store.save(&token).await?;
        tracing::info!(expires_at = %token.expires_at, "Gateway token refreshed");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::store::MemoryTokenStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        delay_ms: u64,
    }

    impl CountingProvider {
        fn new(delay_ms: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay_ms,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn fetch_token(&self) -> Result<CachedToken, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            CachedToken::new(format!("tok-{n}"), 3600)
        }
    }

    #[tokio::test]
    async fn test_fresh_stored_token_is_reused() {
        let store = Arc::new(MemoryTokenStore::with_token(CachedToken::new("stored", 3600).unwrap()));
        let provider = Arc::new(CountingProvider::new(0));
        let broker = CredentialBroker::new(store, provider.clone(), 300);

        assert_eq!(broker.get_token().await.unwrap().access_token, "stored");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed() {
        // Four minutes left, margin is five
        let store = Arc::new(MemoryTokenStore::with_token(CachedToken::new("old", 240).unwrap()));
        let provider = Arc::new(CountingProvider::new(0));
        let broker = CredentialBroker::new(store.clone(), provider.clone(), 300);

        let token = broker.get_token().await.unwrap();
        assert_eq!(token.access_token, "tok-1");
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "tok-1");
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_coalesced() {
        let store = Arc::new(MemoryTokenStore::new());
        let provider = Arc::new(CountingProvider::new(50));
        let broker = Arc::new(CredentialBroker::new(store, provider.clone(), 300));

        let tasks = (0..16).map(|_| {
            let broker = broker.clone();
            tokio::spawn(async move { broker.get_token().await })
        });
        let results = futures::future::join_all(tasks).await;

        for result in results {
            assert_eq!(result.unwrap().unwrap().access_token, "tok-1");
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_forced_refresh() {
        let store = Arc::new(MemoryTokenStore::with_token(CachedToken::new("stored", 3600).unwrap()));
        let provider = Arc::new(CountingProvider::new(0));
        let broker = CredentialBroker::new(store, provider.clone(), 300);

        assert_eq!(broker.refresh().await.unwrap().access_token, "tok-1");
        assert_eq!(broker.get_token().await.unwrap().access_token, "tok-1");
        assert_eq!(provider.calls(), 1);
    }
}
