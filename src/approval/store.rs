//! Change request persistence contract
//!
//! Terminal writes are conditional: they land only while the record is still
//! PENDING and report whether they did. Callers never read-then-write.

use async_trait::async_trait;

use super::error::ApprovalError;
use super::types::{
    ApprovalCommit, ChangeDomain, ChangeRequest, ChangeRequestId, Decision, ListQuery,
    NewChangeRequest,
};

#[async_trait]
pub trait ChangeRequestStore: Send + Sync {
    /// Insert a new record, PENDING unless `approval` is set
    async fn create(&self, request: NewChangeRequest) -> Result<ChangeRequest, ApprovalError>;

    async fn get(&self, id: ChangeRequestId) -> Result<Option<ChangeRequest>, ApprovalError>;

    /// Newest PENDING record for the subject, if any
    async fn find_pending_for_subject(
        &self,
        domain: ChangeDomain,
        subject_ref: &str,
    ) -> Result<Option<ChangeRequest>, ApprovalError>;

    /// PENDING -> APPROVED; `false` when the record was no longer pending
    async fn approve_if_pending(
        &self,
        id: ChangeRequestId,
        commit: &ApprovalCommit,
    ) -> Result<bool, ApprovalError>;

    /// PENDING -> REJECTED; `false` when the record was no longer pending
    async fn reject_if_pending(
        &self,
        id: ChangeRequestId,
        decision: &Decision,
    ) -> Result<bool, ApprovalError>;

    /// Keep the last gateway response of a failed sync; the record stays PENDING
    async fn record_sync_response(
        &self,
        id: ChangeRequestId,
        raw_response: &str,
        unconfirmed: bool,
    ) -> Result<(), ApprovalError>;

    /// Newest first
    async fn list(&self, query: &ListQuery) -> Result<Vec<ChangeRequest>, ApprovalError>;

    /// All records for a subject, newest first
    async fn history(&self, subject_ref: &str) -> Result<Vec<ChangeRequest>, ApprovalError>;
}
