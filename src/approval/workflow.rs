//! Maker-checker approval workflow
//!
//! State machine: PENDING -> {APPROVED, REJECTED}, both terminal.
//!
//! - Maker submit: validate, create PENDING, no gateway call
//! - Admin submit: validate, sync to the gateway, create already APPROVED
//! - Approve (Admin/Checker): sync, then one conditional PENDING -> APPROVED write
//! - Reject (Admin/Checker): local only, one conditional PENDING -> REJECTED write
//!
//! Two approvals of the same record can both reach the gateway before one of
//! them wins the conditional write. The loser reports `AlreadyApproved`; the
//! gateway's idempotent 409 keeps the external effect single.

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::audit::{AuditEntry, AuditEvent, AuditTrail, TracingAuditTrail};
use super::error::ApprovalError;
use super::hook::SyncHook;
use super::payload::ChangePayload;
use super::state::ApprovalState;
use super::store::ChangeRequestStore;
use super::types::{
    ApprovalCommit, ChangeDomain, ChangeRequest, ChangeRequestId, Decision, ListQuery,
    NewChangeRequest,
};
use crate::gateway::{GatewaySync, SyncOutcome};
use crate::logging::{AUDIT_TARGET, RECONCILIATION_TARGET};
use crate::role::{Action, Role, RoleResolver};

/// Checker remark stored for Admin submissions
pub const AUTO_APPROVAL_REMARK: &str = "auto-approved on admin submission";

pub struct ApprovalWorkflow {
    store: Arc<dyn ChangeRequestStore>,
    roles: RoleResolver,
    gateway: Arc<dyn GatewaySync>,
    audit: Arc<dyn AuditTrail>,
    hooks: HashMap<ChangeDomain, Arc<dyn SyncHook>>,
    single_flight: BTreeSet<ChangeDomain>,
}

pub struct ApprovalWorkflowBuilder {
    store: Arc<dyn ChangeRequestStore>,
    roles: RoleResolver,
    gateway: Arc<dyn GatewaySync>,
    audit: Arc<dyn AuditTrail>,
    hooks: HashMap<ChangeDomain, Arc<dyn SyncHook>>,
    single_flight: BTreeSet<ChangeDomain>,
}

impl ApprovalWorkflowBuilder {
    pub fn audit(mut self, audit: Arc<dyn AuditTrail>) -> Self {
        self.audit = audit;
        self
    }

    pub fn hook(mut self, domain: ChangeDomain, hook: Arc<dyn SyncHook>) -> Self {
        self.hooks.insert(domain, hook);
        self
    }

    pub fn single_flight(mut self, domains: impl IntoIterator<Item = ChangeDomain>) -> Self {
        self.single_flight = domains.into_iter().collect();
        self
    }

    pub fn build(self) -> ApprovalWorkflow {
        ApprovalWorkflow {
            store: self.store,
            roles: self.roles,
            gateway: self.gateway,
            audit: self.audit,
            hooks: self.hooks,
            single_flight: self.single_flight,
        }
    }
}

impl ApprovalWorkflow {
    pub fn builder(
        store: Arc<dyn ChangeRequestStore>,
        roles: RoleResolver,
        gateway: Arc<dyn GatewaySync>,
    ) -> ApprovalWorkflowBuilder {
        ApprovalWorkflowBuilder {
            store,
            roles,
            gateway,
            audit: Arc::new(TracingAuditTrail),
            hooks: HashMap::new(),
            single_flight: BTreeSet::new(),
        }
    }

    // ========================================================================
    // Submit
    // ========================================================================

    /// Decode console JSON for `domain` and submit it
    pub async fn submit_json(
        &self,
        actor: &str,
        domain: ChangeDomain,
        payload: serde_json::Value,
    ) -> Result<ChangeRequest, ApprovalError> {
        let payload = ChangePayload::parse(domain, payload)?;
        self.submit(actor, payload).await
    }

    pub async fn submit(
        &self,
        actor: &str,
        mut payload: ChangePayload,
    ) -> Result<ChangeRequest, ApprovalError> {
        payload.normalize();
        let domain = payload.domain();
        let subject_ref = payload.subject_ref();

        let role = self.roles.resolve(actor).await?;
        if let Err(e) = crate::role::authorize(role, Action::Submit) {
            self.audit.record(
                AuditEntry::new(AuditEvent::Denied, domain, &subject_ref, actor)
                    .detail(e.to_string()),
            );
            return Err(e);
        }

        payload.validate()?;
        payload.assign_transaction_id();

        if self.single_flight.contains(&domain)
            && let Some(pending) = self
                .store
                .find_pending_for_subject(domain, &subject_ref)
                .await?
        {
            return Err(ApprovalError::PendingExists {
                id: pending.id,
                subject: subject_ref,
            });
        }

        let maker_at = Utc::now();
        if role.auto_approves() {
            return self.submit_approved(actor, payload, maker_at).await;
        }

        let record = self
            .store
            .create(NewChangeRequest {
                payload,
                maker_by: actor.to_string(),
                maker_at,
                maker_approved: true,
                approval: None,
            })
            .await?;

        tracing::info!(
            change_id = record.id,
            domain = %domain,
            subject = %record.subject_ref,
            maker = actor,
            "Change request queued for checker"
        );
        self.audit.record(
            AuditEntry::new(AuditEvent::Submitted, domain, &record.subject_ref, actor)
                .change(record.id),
        );
        Ok(record)
    }

    /// Admin path: gateway first, then a single insert born APPROVED
    async fn submit_approved(
        &self,
        actor: &str,
        payload: ChangePayload,
        maker_at: chrono::DateTime<Utc>,
    ) -> Result<ChangeRequest, ApprovalError> {
        let domain = payload.domain();
        let subject_ref = payload.subject_ref();

        let commit = self
            .synchronize(
                &payload,
                Decision::now(actor, AUTO_APPROVAL_REMARK),
                None,
                actor,
            )
            .await?;
        let external_ref = commit.external_ref.clone();

        let created = self
            .store
            .create(NewChangeRequest {
                payload,
                maker_by: actor.to_string(),
                maker_at,
                maker_approved: true,
                approval: Some(commit),
            })
            .await;

        match created {
            Ok(record) => {
                tracing::info!(
                    change_id = record.id,
                    domain = %domain,
                    external_ref = %record.external_ref,
                    admin = actor,
                    "Admin change applied and recorded"
                );
                self.audit.record(
                    AuditEntry::new(AuditEvent::Submitted, domain, &subject_ref, actor)
                        .change(record.id),
                );
                self.audit.record(
                    AuditEntry::new(AuditEvent::Approved, domain, &subject_ref, actor)
                        .change(record.id)
                        .detail(&record.external_ref),
                );
                Ok(record)
            }
            Err(e) => {
                let detail = format!(
                    "gateway applied {external_ref} but the change request insert failed: {e}"
                );
                self.audit.record(
                    AuditEntry::new(AuditEvent::Divergence, domain, &subject_ref, actor)
                        .detail(&detail),
                );
                Err(ApprovalError::Persistence(detail))
            }
        }
    }

    // ========================================================================
    // Approve / Reject
    // ========================================================================

    pub async fn approve(
        &self,
        actor: &str,
        id: ChangeRequestId,
        remark: &str,
    ) -> Result<ChangeRequest, ApprovalError> {
        self.authorize_decision(actor, Action::Approve, id).await?;
        let remark = require_remark(remark)?;
        let record = self.pending_record(id).await?;
        if record.sync_unconfirmed && !record.payload.replay_safe() {
            tracing::warn!(
                target: RECONCILIATION_TARGET,
                change_id = id,
                subject = %record.subject_ref,
                checker = actor,
                "Refusing to resend a gateway write whose earlier outcome is unknown"
            );
            return Err(ApprovalError::ReconciliationRequired(id));
        }

        let commit = self
            .synchronize(
                &record.payload,
                Decision::now(actor, remark),
                Some(id),
                actor,
            )
            .await?;

        let landed = match self.store.approve_if_pending(id, &commit).await {
            Ok(landed) => landed,
            Err(e) => {
                let detail = format!(
                    "gateway applied {} but the approval write failed: {e}",
                    commit.external_ref
                );
                self.audit.record(
                    AuditEntry::new(AuditEvent::Divergence, record.domain(), &record.subject_ref, actor)
                        .change(id)
                        .detail(&detail),
                );
                return Err(ApprovalError::Persistence(detail));
            }
        };

        let current = match self.store.get(id).await {
            Ok(Some(current)) => current,
            reread if landed => {
                tracing::warn!(
                    change_id = id,
                    error = ?reread.err(),
                    "Approved change request could not be re-read; returning the committed view"
                );
                let mut view = record;
                view.apply_commit(&commit);
                view
            }
            Ok(None) => return Err(ApprovalError::NotFound(id)),
            Err(e) => return Err(e),
        };

        if landed {
            tracing::info!(
                change_id = id,
                domain = %current.domain(),
                external_ref = %current.external_ref,
                checker = actor,
                "Change request approved"
            );
            self.audit.record(
                AuditEntry::new(AuditEvent::Approved, current.domain(), &current.subject_ref, actor)
                    .change(id)
                    .detail(&current.external_ref),
            );
            return Ok(current);
        }

        // Another decision landed while the gateway call was in flight
        match current.state() {
            ApprovalState::Approved => {
                tracing::warn!(
                    change_id = id,
                    checker = actor,
                    "Concurrent approval won the conditional write"
                );
                Err(ApprovalError::AlreadyApproved(id))
            }
            _ => {
                let detail = format!(
                    "gateway applied {} but the record was {} concurrently",
                    commit.external_ref,
                    current.state()
                );
                self.audit.record(
                    AuditEntry::new(AuditEvent::Divergence, current.domain(), &current.subject_ref, actor)
                        .change(id)
                        .detail(&detail),
                );
                Err(ApprovalError::Persistence(detail))
            }
        }
    }

    pub async fn reject(
        &self,
        actor: &str,
        id: ChangeRequestId,
        remark: &str,
    ) -> Result<ChangeRequest, ApprovalError> {
        self.authorize_decision(actor, Action::Reject, id).await?;
        let remark = require_remark(remark)?;
        self.pending_record(id).await?;

        let landed = self
            .store
            .reject_if_pending(id, &Decision::now(actor, remark))
            .await?;
        let current = self
            .store
            .get(id)
            .await?
            .ok_or(ApprovalError::NotFound(id))?;

        if !landed {
            return Err(terminal_error(&current));
        }

        tracing::info!(
            change_id = id,
            domain = %current.domain(),
            checker = actor,
            "Change request rejected"
        );
        self.audit.record(
            AuditEntry::new(AuditEvent::Rejected, current.domain(), &current.subject_ref, actor)
                .change(id)
                .detail(remark),
        );
        Ok(current)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get(&self, id: ChangeRequestId) -> Result<ChangeRequest, ApprovalError> {
        self.store.get(id).await?.ok_or(ApprovalError::NotFound(id))
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<ChangeRequest>, ApprovalError> {
        self.store.list(query).await
    }

    pub async fn history(&self, subject_ref: &str) -> Result<Vec<ChangeRequest>, ApprovalError> {
        self.store.history(subject_ref).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn authorize_decision(
        &self,
        actor: &str,
        action: Action,
        id: ChangeRequestId,
    ) -> Result<Role, ApprovalError> {
        self.roles.authorize(actor, action).await.inspect_err(|e| {
            tracing::warn!(
                target: AUDIT_TARGET,
                event = AuditEvent::Denied.as_str(),
                change_id = id,
                actor,
                action = %action,
                detail = %e
            );
        })
    }

    async fn pending_record(&self, id: ChangeRequestId) -> Result<ChangeRequest, ApprovalError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or(ApprovalError::NotFound(id))?;
        if record.state().is_terminal() {
            return Err(terminal_error(&record));
        }
        Ok(record)
    }

    /// Push the change to the gateway and build the approval write
    ///
    /// Rejected and unknown outcomes leave the record PENDING with the raw
    /// answer captured (when the record already exists).
    async fn synchronize(
        &self,
        payload: &ChangePayload,
        decision: Decision,
        id: Option<ChangeRequestId>,
        actor: &str,
    ) -> Result<ApprovalCommit, ApprovalError> {
        let domain = payload.domain();
        let subject_ref = payload.subject_ref();
        let hook = self.hooks.get(&domain).cloned();

        let previous_balance = match &hook {
            Some(hook) => match hook.before_apply(payload).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    self.sync_failed(domain, &subject_ref, actor, id, &e.to_string());
                    return Err(e);
                }
            },
            None => None,
        };

        let outcome = self.gateway.apply(payload).await;
        tracing::info!(
            change_id = id.unwrap_or_default(),
            domain = %domain,
            adapter = self.gateway.name(),
            outcome = outcome.label(),
            "Gateway sync finished"
        );

        let (external_ref, raw_response) = match &outcome {
            SyncOutcome::Applied(applied) => {
                (applied.external_ref.clone(), applied.raw_response.clone())
            }
            SyncOutcome::AlreadyApplied { raw_response } => {
                let external_ref = payload.natural_ref().unwrap_or_default();
                if external_ref.is_empty() {
                    tracing::warn!(
                        subject = %subject_ref,
                        "Gateway reports change already applied but no gateway name is known"
                    );
                }
                (external_ref, raw_response.clone())
            }
            SyncOutcome::Rejected {
                message,
                raw_response,
            } => {
                self.capture_failure(id, raw_response, false).await;
                self.sync_failed(domain, &subject_ref, actor, id, message);
                return Err(ApprovalError::Upstream(message.clone()));
            }
            SyncOutcome::Unknown { message } => {
                self.capture_failure(id, message, true).await;
                self.sync_failed(domain, &subject_ref, actor, id, message);
                return Err(ApprovalError::UpstreamUnknown(message.clone()));
            }
        };

        if let Some(hook) = &hook
            && let Err(e) = hook.after_apply(payload, &outcome).await
        {
            tracing::error!(
                target: RECONCILIATION_TARGET,
                change_id = id.unwrap_or_default(),
                subject = %subject_ref,
                error = %e,
                "Post-sync step failed after the gateway applied the change"
            );
        }

        Ok(ApprovalCommit {
            decision,
            external_ref,
            raw_response,
            previous_balance,
        })
    }

    /// Keep the gateway's answer on the pending record
    ///
    /// `unconfirmed` marks a write that may have landed without a response.
    async fn capture_failure(&self, id: Option<ChangeRequestId>, raw: &str, unconfirmed: bool) {
        let Some(id) = id else { return };
        if let Err(e) = self.store.record_sync_response(id, raw, unconfirmed).await {
            if unconfirmed {
                tracing::error!(
                    target: RECONCILIATION_TARGET,
                    change_id = id,
                    error = %e,
                    "Failed to mark change request as unconfirmed"
                );
            } else {
                tracing::warn!(change_id = id, error = %e, "Failed to store gateway response");
            }
        }
    }

    fn sync_failed(
        &self,
        domain: ChangeDomain,
        subject_ref: &str,
        actor: &str,
        id: Option<ChangeRequestId>,
        detail: &str,
    ) {
        let mut entry =
            AuditEntry::new(AuditEvent::SyncFailed, domain, subject_ref, actor).detail(detail);
        if let Some(id) = id {
            entry = entry.change(id);
        }
        self.audit.record(entry);
    }
}

fn require_remark(remark: &str) -> Result<&str, ApprovalError> {
    let remark = remark.trim();
    if remark.is_empty() {
        return Err(ApprovalError::RemarkRequired);
    }
    Ok(remark)
}

fn terminal_error(record: &ChangeRequest) -> ApprovalError {
    match record.state() {
        ApprovalState::Rejected => ApprovalError::AlreadyRejected(record.id),
        _ => ApprovalError::AlreadyApproved(record.id),
    }
}
