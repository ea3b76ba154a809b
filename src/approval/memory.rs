//! In-memory change request store
//!
//! Same conditional-write semantics as the PostgreSQL store; the write lock
//! makes each check-and-set atomic.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::error::ApprovalError;
use super::store::ChangeRequestStore;
use super::types::{
    ApprovalCommit, ChangeDomain, ChangeRequest, ChangeRequestId, CheckerDecision, Decision,
    ListQuery, NewChangeRequest, Verdict,
};

pub struct MemoryChangeRequestStore {
    records: RwLock<BTreeMap<ChangeRequestId, ChangeRequest>>,
    next_id: AtomicI64,
}

impl MemoryChangeRequestStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryChangeRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeRequestStore for MemoryChangeRequestStore {
    async fn create(&self, request: NewChangeRequest) -> Result<ChangeRequest, ApprovalError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let subject_ref = request.payload.subject_ref();

        let (checker, external_ref, raw, previous_balance) = match request.approval {
            Some(commit) => (
                Some(CheckerDecision {
                    verdict: Verdict::Approved,
                    decision: commit.decision,
                }),
                commit.external_ref,
                Some(commit.raw_response),
                commit.previous_balance,
            ),
            None => (None, String::new(), None, None),
        };

        let record = ChangeRequest {
            id,
            subject_ref,
            payload: request.payload,
            maker_by: request.maker_by,
            maker_at: request.maker_at,
            maker_approved: request.maker_approved,
            checker,
            external_ref,
            external_raw_response: raw,
            previous_balance,
            sync_unconfirmed: false,
        };
        self.records.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: ChangeRequestId) -> Result<Option<ChangeRequest>, ApprovalError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_pending_for_subject(
        &self,
        domain: ChangeDomain,
        subject_ref: &str,
    ) -> Result<Option<ChangeRequest>, ApprovalError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .rev()
            .find(|r| r.domain() == domain && r.subject_ref == subject_ref && r.is_pending())
            .cloned())
    }

    async fn approve_if_pending(
        &self,
        id: ChangeRequestId,
        commit: &ApprovalCommit,
    ) -> Result<bool, ApprovalError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.is_pending() => {
                record.apply_commit(commit);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reject_if_pending(
        &self,
        id: ChangeRequestId,
        decision: &Decision,
    ) -> Result<bool, ApprovalError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.is_pending() => {
                record.checker = Some(CheckerDecision {
                    verdict: Verdict::Rejected,
                    decision: decision.clone(),
                });
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_sync_response(
        &self,
        id: ChangeRequestId,
        raw_response: &str,
        unconfirmed: bool,
    ) -> Result<(), ApprovalError> {
        if let Some(record) = self.records.write().await.get_mut(&id)
            && record.is_pending()
        {
            record.external_raw_response = Some(raw_response.to_string());
            record.sync_unconfirmed |= unconfirmed;
        }
        Ok(())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<ChangeRequest>, ApprovalError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .rev()
            .filter(|r| query.domain.is_none_or(|d| r.domain() == d))
            .filter(|r| query.state.is_none_or(|s| r.state() == s))
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn history(&self, subject_ref: &str) -> Result<Vec<ChangeRequest>, ApprovalError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .rev()
            .filter(|r| r.subject_ref == subject_ref)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::payload::{ChangePayload, KvmEntryPayload};
    use crate::approval::state::ApprovalState;
    use chrono::Utc;

    fn kvm(name: &str) -> NewChangeRequest {
        NewChangeRequest {
            payload: ChangePayload::KvmEntry(KvmEntryPayload {
                environment: "prod".into(),
                map_name: "routing".into(),
                name: name.into(),
                value: serde_json::json!("10"),
                replace: false,
            }),
            maker_by: "maker".into(),
            maker_at: Utc::now(),
            maker_approved: true,
            approval: None,
        }
    }

    fn commit() -> ApprovalCommit {
        ApprovalCommit {
            decision: Decision::now("checker", "ok"),
            external_ref: "std".into(),
            raw_response: "{}".into(),
            previous_balance: None,
        }
    }

    #[tokio::test]
    async fn test_conditional_writes_only_from_pending() {
        let store = MemoryChangeRequestStore::new();
        let record = store.create(kvm("std")).await.unwrap();
        assert_eq!(record.state(), ApprovalState::Pending);

        assert!(
            store
                .reject_if_pending(record.id, &Decision::now("checker", "no"))
                .await
                .unwrap()
        );
        assert!(!store.approve_if_pending(record.id, &commit()).await.unwrap());

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), ApprovalState::Rejected);
        assert!(stored.external_ref.is_empty());
    }

    #[tokio::test]
    async fn test_sync_response_ignored_once_terminal() {
        let store = MemoryChangeRequestStore::new();
        let record = store.create(kvm("std")).await.unwrap();
        store.approve_if_pending(record.id, &commit()).await.unwrap();

        store.record_sync_response(record.id, "late", true).await.unwrap();
        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.external_raw_response.as_deref(), Some("{}"));
        assert!(!stored.sync_unconfirmed);
    }

    #[tokio::test]
    async fn test_unconfirmed_flag_is_sticky() {
        let store = MemoryChangeRequestStore::new();
        let record = store.create(kvm("std")).await.unwrap();
        assert!(!record.sync_unconfirmed);

        store.record_sync_response(record.id, "timed out", true).await.unwrap();
        store.record_sync_response(record.id, "{\"error\":{}}", false).await.unwrap();

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert!(stored.sync_unconfirmed);
        assert_eq!(stored.external_raw_response.as_deref(), Some("{\"error\":{}}"));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filters() {
        let store = MemoryChangeRequestStore::new();
        let a = store.create(kvm("a")).await.unwrap();
        let b = store.create(kvm("b")).await.unwrap();
        let c = store.create(kvm("c")).await.unwrap();
        store.approve_if_pending(b.id, &commit()).await.unwrap();

        let all = store.list(&ListQuery::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        let pending = store
            .list(&ListQuery::pending(ChangeDomain::KvmEntry))
            .await
            .unwrap();
        let ids: Vec<_> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c.id, a.id]);

        let page = store
            .list(&ListQuery {
                limit: 1,
                offset: 1,
                ..ListQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, b.id);
    }

    #[tokio::test]
    async fn test_find_pending_for_subject() {
        let store = MemoryChangeRequestStore::new();
        let record = store.create(kvm("std")).await.unwrap();
        let subject = record.subject_ref.clone();

        let found = store
            .find_pending_for_subject(ChangeDomain::KvmEntry, &subject)
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(record.id));

        store
            .reject_if_pending(record.id, &Decision::now("checker", "no"))
            .await
            .unwrap();
        assert!(
            store
                .find_pending_for_subject(ChangeDomain::KvmEntry, &subject)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.history(&subject).await.unwrap().len(), 1);
    }
}
