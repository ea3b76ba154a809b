//! Local wallet balance cache
//!
//! Values are only ever overwritten with balances the gateway reported.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::approval::error::ApprovalError;
use crate::db::{Database, SafeRow};

#[async_trait]
pub trait WalletBalanceStore: Send + Sync {
    async fn get(
        &self,
        developer_email: &str,
        currency_code: &str,
    ) -> Result<Option<Decimal>, ApprovalError>;

    async fn put(
        &self,
        developer_email: &str,
        currency_code: &str,
        balance: Decimal,
    ) -> Result<(), ApprovalError>;
}

pub struct PgWalletBalanceStore {
    db: Database,
}

impl PgWalletBalanceStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WalletBalanceStore for PgWalletBalanceStore {
    async fn get(
        &self,
        developer_email: &str,
        currency_code: &str,
    ) -> Result<Option<Decimal>, ApprovalError> {
        let row = sqlx::query(
            r#"
            SELECT balance FROM wallet_balances_tb
            WHERE developer_email = $1 AND currency_code = $2
            "#,
        )
        .bind(developer_email)
        .bind(currency_code)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(row.get_logged("balance")?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        developer_email: &str,
        currency_code: &str,
        balance: Decimal,
    ) -> Result<(), ApprovalError> {
        sqlx::query(
            r#"
            INSERT INTO wallet_balances_tb (developer_email, currency_code, balance, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (developer_email, currency_code) DO UPDATE
            SET balance = EXCLUDED.balance, updated_at = NOW()
            "#,
        )
        .bind(developer_email)
        .bind(currency_code)
        .bind(balance)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryWalletBalanceStore {
    balances: RwLock<HashMap<(String, String), Decimal>>,
}

impl MemoryWalletBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletBalanceStore for MemoryWalletBalanceStore {
    async fn get(
        &self,
        developer_email: &str,
        currency_code: &str,
    ) -> Result<Option<Decimal>, ApprovalError> {
        Ok(self
            .balances
            .read()
            .await
            .get(&(developer_email.to_string(), currency_code.to_string()))
            .copied())
    }

    async fn put(
        &self,
        developer_email: &str,
        currency_code: &str,
        balance: Decimal,
    ) -> Result<(), ApprovalError> {
        self.balances.write().await.insert(
            (developer_email.to_string(), currency_code.to_string()),
            balance,
        );
        Ok(())
    }
}
