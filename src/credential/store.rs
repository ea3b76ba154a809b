//! Durable token storage shared by every process

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::error::CredentialError;
use super::token::CachedToken;
use crate::db::{Database, SafeRow};

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<CachedToken>, CredentialError>;

    /// Replace the stored token; concurrent writers race and the last one wins
    async fn save(&self, token: &CachedToken) -> Result<(), CredentialError>;
}

/// Single-row `gateway_tokens_tb`
pub struct PgTokenStore {
    db: Database,
}

impl PgTokenStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn load(&self) -> Result<Option<CachedToken>, CredentialError> {
        let row = sqlx::query("SELECT access_token, expires_at FROM gateway_tokens_tb WHERE id = 1")
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(row) => {
                let access_token: String = row.get_logged("access_token")?;
                let expires_at: DateTime<Utc> = row.get_logged("expires_at")?;
                Ok(Some(CachedToken {
                    access_token,
                    expires_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, token: &CachedToken) -> Result<(), CredentialError> {
        sqlx::query(
            r#"
            INSERT INTO gateway_tokens_tb (id, access_token, expires_at, updated_at)
            VALUES (1, $1, $2, NOW())
            ON CONFLICT (id) DO UPDATE
            SET access_token = EXCLUDED.access_token,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(&token.access_token)
        .bind(token.expires_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<CachedToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CachedToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<CachedToken>, CredentialError> {
        Ok(self.token.read().await.clone())
    }

    async fn save(&self, token: &CachedToken) -> Result<(), CredentialError> {
        *self.token.write().await = Some(token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_token_store_upsert() {
        let pool = crate::db::test_support::create_test_pool().await;
        let store = PgTokenStore::new(Database::from_pool(pool));

        store.save(&CachedToken::new("first", 3600).unwrap()).await.unwrap();
        store.save(&CachedToken::new("second", 3600).unwrap()).await.unwrap();

        let token = store.load().await.unwrap().unwrap();
        assert_eq!(token.access_token, "second");
    }
}
