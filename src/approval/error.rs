//! Approval error types
//!
//! Every failure of the workflow maps to one [`ErrorClass`]; callers render
//! it through [`super::response::ApiResponse`].

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::ChangeRequestId;
use crate::role::{Action, Role};

/// Coarse classification used for status codes and audit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Authority,
    Validation,
    Precondition,
    Upstream,
    Persistence,
    Internal,
}

#[derive(Error, Debug, Clone)]
pub enum ApprovalError {
    // === Authority ===
    #[error("Actor has no maker/checker authority")]
    NoAuthority,

    #[error("{role} may not {action} change requests")]
    Forbidden { role: Role, action: Action },

    // === Validation ===
    #[error("Invalid payload: {0}")]
    Validation(String),

    #[error("Remark is required")]
    RemarkRequired,

    #[error("Insufficient wallet balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    // === Precondition ===
    #[error("Change request not found: {0}")]
    NotFound(ChangeRequestId),

    #[error("Change request {0} is already approved")]
    AlreadyApproved(ChangeRequestId),

    #[error("Change request {0} is already rejected")]
    AlreadyRejected(ChangeRequestId),

    #[error("Change request {id} is already pending for {subject}")]
    PendingExists {
        id: ChangeRequestId,
        subject: String,
    },

    /// A previous gateway write may have landed and cannot be safely resent
    #[error("Change request {0} has an unconfirmed gateway write; reconcile with the gateway, then reject it")]
    ReconciliationRequired(ChangeRequestId),

    // === Upstream ===
    #[error("Gateway error: {0}")]
    Upstream(String),

    /// Detail is kept for logs; users get the generic retry message
    #[error("Gateway did not confirm the change, please try again later")]
    UpstreamUnknown(String),

    // === Persistence ===
    #[error("Change was applied on the gateway but could not be recorded: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl ApprovalError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApprovalError::NoAuthority | ApprovalError::Forbidden { .. } => ErrorClass::Authority,
            ApprovalError::Validation(_)
            | ApprovalError::RemarkRequired
            | ApprovalError::InsufficientBalance { .. } => ErrorClass::Validation,
            ApprovalError::NotFound(_)
            | ApprovalError::AlreadyApproved(_)
            | ApprovalError::AlreadyRejected(_)
            | ApprovalError::PendingExists { .. }
            | ApprovalError::ReconciliationRequired(_) => ErrorClass::Precondition,
            ApprovalError::Upstream(_) | ApprovalError::UpstreamUnknown(_) => ErrorClass::Upstream,
            ApprovalError::Persistence(_) => ErrorClass::Persistence,
            ApprovalError::Database(_) => ErrorClass::Internal,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ApprovalError::NoAuthority => "NO_AUTHORITY",
            ApprovalError::Forbidden { .. } => "FORBIDDEN",
            ApprovalError::Validation(_) => "VALIDATION_FAILED",
            ApprovalError::RemarkRequired => "REMARK_REQUIRED",
            ApprovalError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ApprovalError::NotFound(_) => "NOT_FOUND",
            ApprovalError::AlreadyApproved(_) => "ALREADY_APPROVED",
            ApprovalError::AlreadyRejected(_) => "ALREADY_REJECTED",
            ApprovalError::PendingExists { .. } => "PENDING_EXISTS",
            ApprovalError::ReconciliationRequired(_) => "RECONCILIATION_REQUIRED",
            ApprovalError::Upstream(_) => "UPSTREAM_ERROR",
            ApprovalError::UpstreamUnknown(_) => "UPSTREAM_UNKNOWN",
            ApprovalError::Persistence(_) => "PERSISTENCE_ERROR",
            ApprovalError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            ApprovalError::NoAuthority | ApprovalError::Forbidden { .. } => 403,
            ApprovalError::Validation(_) | ApprovalError::RemarkRequired => 400,
            ApprovalError::InsufficientBalance { .. } => 422,
            ApprovalError::NotFound(_) => 404,
            ApprovalError::AlreadyApproved(_)
            | ApprovalError::AlreadyRejected(_)
            | ApprovalError::PendingExists { .. }
            | ApprovalError::ReconciliationRequired(_) => 409,
            ApprovalError::Upstream(_) => 502,
            ApprovalError::UpstreamUnknown(_) => 503,
            ApprovalError::Persistence(_) | ApprovalError::Database(_) => 500,
        }
    }
}

impl From<sqlx::Error> for ApprovalError {
    fn from(e: sqlx::Error) -> Self {
        ApprovalError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for ApprovalError {
    fn from(e: serde_json::Error) -> Self {
        ApprovalError::Database(format!("corrupt payload column: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_status_differs_from_validation() {
        let authority = ApprovalError::Forbidden {
            role: Role::Maker,
            action: Action::Approve,
        };
        let validation = ApprovalError::Validation("name: must not be empty".into());

        assert_eq!(authority.class(), ErrorClass::Authority);
        assert_eq!(validation.class(), ErrorClass::Validation);
        assert_ne!(authority.http_status(), validation.http_status());
        assert_eq!(ApprovalError::NoAuthority.http_status(), 403);
    }

    #[test]
    fn test_precondition_distinct_from_not_found() {
        assert_eq!(ApprovalError::NotFound(7).http_status(), 404);
        assert_eq!(ApprovalError::AlreadyRejected(7).http_status(), 409);
        assert_ne!(
            ApprovalError::NotFound(7).code(),
            ApprovalError::AlreadyRejected(7).code()
        );
    }

    #[test]
    fn test_display() {
        let err = ApprovalError::Forbidden {
            role: Role::Checker,
            action: Action::Submit,
        };
        assert_eq!(err.to_string(), "CHECKER may not submit change requests");
        assert_eq!(
            ApprovalError::Upstream("Rate plan name already used".into()).to_string(),
            "Gateway error: Rate plan name already used"
        );
        assert_eq!(
            ApprovalError::UpstreamUnknown("connection reset".into()).to_string(),
            "Gateway did not confirm the change, please try again later"
        );
    }
}
