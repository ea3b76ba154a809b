//! Wallet ledger
//!
//! Credits and debits are ordinary change requests in the
//! `wallet_transaction` domain. [`WalletGuard`] adds the wallet rules around
//! the gateway write:
//!
//! - debit: read the gateway balance first and refuse locally when short
//! - after an effective write: overwrite the cached balance with the one the
//!   gateway reported, never compute it locally

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::store::WalletBalanceStore;
use crate::approval::error::ApprovalError;
use crate::approval::hook::SyncHook;
use crate::approval::payload::{ChangePayload, TransactionKind, WalletPayload};
use crate::approval::types::ChangeRequest;
use crate::approval::workflow::ApprovalWorkflow;
use crate::gateway::{GatewaySync, SyncOutcome};

pub struct WalletGuard {
    gateway: Arc<dyn GatewaySync>,
    balances: Arc<dyn WalletBalanceStore>,
}

impl WalletGuard {
    pub fn new(gateway: Arc<dyn GatewaySync>, balances: Arc<dyn WalletBalanceStore>) -> Self {
        Self { gateway, balances }
    }

    async fn refresh_cache(&self, tx: &WalletPayload, balance: Decimal) -> Result<(), ApprovalError> {
        self.balances
            .put(&tx.developer_email, &tx.currency_code, balance)
            .await?;
        tracing::info!(
            developer = %tx.developer_email,
            currency = %tx.currency_code,
            balance = %balance,
            "Wallet balance cache overwritten from gateway"
        );
        Ok(())
    }
}

#[async_trait]
impl SyncHook for WalletGuard {
    async fn before_apply(&self, payload: &ChangePayload) -> Result<Option<Decimal>, ApprovalError> {
        let Some(tx) = payload.as_wallet() else {
            return Ok(None);
        };

        match tx.kind {
            TransactionKind::Debit => {
                let available = self
                    .gateway
                    .wallet_balance(&tx.developer_email, &tx.currency_code)
                    .await?;
                if tx.amount > available {
                    tracing::warn!(
                        developer = %tx.developer_email,
                        requested = %tx.amount,
                        available = %available,
                        "Debit refused: insufficient gateway balance"
                    );
                    return Err(ApprovalError::InsufficientBalance {
                        requested: tx.amount,
                        available,
                    });
                }
                Ok(Some(available))
            }
            TransactionKind::Credit => {
                self.balances
                    .get(&tx.developer_email, &tx.currency_code)
                    .await
            }
        }
    }

    async fn after_apply(
        &self,
        payload: &ChangePayload,
        outcome: &SyncOutcome,
    ) -> Result<(), ApprovalError> {
        let Some(tx) = payload.as_wallet() else {
            return Ok(());
        };

        let balance = match outcome {
            SyncOutcome::Applied(applied) => match applied.balance {
                Some(balance) => balance,
                None => {
                    self.gateway
                        .wallet_balance(&tx.developer_email, &tx.currency_code)
                        .await?
                }
            },
            // The conflict body carries no balance
            SyncOutcome::AlreadyApplied { .. } => {
                self.gateway
                    .wallet_balance(&tx.developer_email, &tx.currency_code)
                    .await?
            }
            SyncOutcome::Rejected { .. } | SyncOutcome::Unknown { .. } => return Ok(()),
        };
        self.refresh_cache(tx, balance).await
    }
}

/// Credit/debit entry points over the approval workflow
pub struct WalletLedger {
    workflow: Arc<ApprovalWorkflow>,
    balances: Arc<dyn WalletBalanceStore>,
}

impl WalletLedger {
    pub fn new(workflow: Arc<ApprovalWorkflow>, balances: Arc<dyn WalletBalanceStore>) -> Self {
        Self { workflow, balances }
    }

    pub async fn credit(
        &self,
        actor: &str,
        developer_email: &str,
        currency_code: &str,
        amount: Decimal,
        note: Option<&str>,
    ) -> Result<ChangeRequest, ApprovalError> {
        self.submit(actor, developer_email, currency_code, amount, TransactionKind::Credit, note)
            .await
    }

    pub async fn debit(
        &self,
        actor: &str,
        developer_email: &str,
        currency_code: &str,
        amount: Decimal,
        note: Option<&str>,
    ) -> Result<ChangeRequest, ApprovalError> {
        self.submit(actor, developer_email, currency_code, amount, TransactionKind::Debit, note)
            .await
    }

    /// Last balance the gateway reported, if any transaction went through
    pub async fn cached_balance(
        &self,
        developer_email: &str,
        currency_code: &str,
    ) -> Result<Option<Decimal>, ApprovalError> {
        self.balances.get(developer_email, currency_code).await
    }

    async fn submit(
        &self,
        actor: &str,
        developer_email: &str,
        currency_code: &str,
        amount: Decimal,
        kind: TransactionKind,
        note: Option<&str>,
    ) -> Result<ChangeRequest, ApprovalError> {
        let payload = ChangePayload::WalletTransaction(WalletPayload {
            developer_email: developer_email.to_string(),
            currency_code: currency_code.to_string(),
            amount,
            kind,
            transaction_id: None,
            note: note.map(str::to_string),
        });
        self.workflow.submit(actor, payload).await
    }
}
