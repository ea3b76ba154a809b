use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::ApprovalError;
use super::payload::ChangePayload;
use crate::gateway::SyncOutcome;

/// Domain-specific steps around the gateway write
#[async_trait]
pub trait SyncHook: Send + Sync {
    /// Runs right before the write; an error aborts without calling the gateway.
    /// Returns the balance snapshot to store as `previous_balance`, if any.
    async fn before_apply(&self, payload: &ChangePayload) -> Result<Option<Decimal>, ApprovalError>;

    /// Runs after an effective outcome, before the record is marked approved
    async fn after_apply(
        &self,
        payload: &ChangePayload,
        outcome: &SyncOutcome,
    ) -> Result<(), ApprovalError>;
}
