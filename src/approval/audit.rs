//! Audit trail for terminal workflow outcomes
//!
//! The default sink writes structured events on the `audit` tracing target;
//! divergence between the gateway and the local store additionally goes to
//! the `reconciliation` target.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{ChangeDomain, ChangeRequestId};
use crate::logging::{AUDIT_TARGET, RECONCILIATION_TARGET};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Submitted,
    Approved,
    Rejected,
    /// Gateway refused or did not confirm; record stays pending
    SyncFailed,
    /// Gateway applied the change but the local write did not land
    Divergence,
    /// Authority check failed
    Denied,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Submitted => "submitted",
            AuditEvent::Approved => "approved",
            AuditEvent::Rejected => "rejected",
            AuditEvent::SyncFailed => "sync_failed",
            AuditEvent::Divergence => "divergence",
            AuditEvent::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub event: AuditEvent,
    pub change_id: Option<ChangeRequestId>,
    pub domain: ChangeDomain,
    pub subject_ref: String,
    pub actor: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(event: AuditEvent, domain: ChangeDomain, subject_ref: &str, actor: &str) -> Self {
        Self {
            event,
            change_id: None,
            domain,
            subject_ref: subject_ref.to_string(),
            actor: actor.to_string(),
            detail: String::new(),
            at: Utc::now(),
        }
    }

    pub fn change(mut self, id: ChangeRequestId) -> Self {
        self.change_id = Some(id);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

pub trait AuditTrail: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Emits audit entries as tracing events
#[derive(Debug, Default, Clone)]
pub struct TracingAuditTrail;

impl AuditTrail for TracingAuditTrail {
    fn record(&self, entry: AuditEntry) {
        let change_id = entry.change_id.unwrap_or_default();
        match entry.event {
            AuditEvent::Divergence => {
                tracing::error!(
                    target: RECONCILIATION_TARGET,
                    change_id,
                    domain = %entry.domain,
                    subject = %entry.subject_ref,
                    actor = %entry.actor,
                    detail = %entry.detail,
                    "Gateway and local store diverged"
                );
            }
            AuditEvent::SyncFailed | AuditEvent::Denied => {
                tracing::warn!(
                    target: AUDIT_TARGET,
                    event = entry.event.as_str(),
                    change_id,
                    domain = %entry.domain,
                    subject = %entry.subject_ref,
                    actor = %entry.actor,
                    detail = %entry.detail
                );
            }
            _ => {
                tracing::info!(
                    target: AUDIT_TARGET,
                    event = entry.event.as_str(),
                    change_id,
                    domain = %entry.domain,
                    subject = %entry.subject_ref,
                    actor = %entry.actor,
                    detail = %entry.detail
                );
            }
        }
    }
}

/// Collects entries in memory for assertions
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryAuditTrail {
        entries: Mutex<Vec<AuditEntry>>,
    }

    impl MemoryAuditTrail {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<AuditEvent> {
            self.entries.lock().unwrap().iter().map(|e| e.event).collect()
        }

        pub fn entries(&self) -> Vec<AuditEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl AuditTrail for MemoryAuditTrail {
        fn record(&self, entry: AuditEntry) {
            self.entries.lock().unwrap().push(entry);
        }
    }
}
