//! Uniform result envelope
//!
//! - code: 0 = success, non-zero = error code
//! - msg: short message description
//! - data: payload on success, absent on error

use serde::Serialize;

use super::error::ApprovalError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    /// HTTP status the caller should answer with
    #[serde(skip)]
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            status: 200,
            data: Some(data),
        }
    }

    pub fn error(err: &ApprovalError) -> Self {
        Self {
            code: error_codes::for_error(err),
            msg: err.to_string(),
            status: err.http_status(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == error_codes::SUCCESS
    }
}

impl<T> From<Result<T, ApprovalError>> for ApiResponse<T> {
    fn from(result: Result<T, ApprovalError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::error(&err),
        }
    }
}

/// Standard API error codes
pub mod error_codes {
    use super::ApprovalError;

    pub const SUCCESS: i32 = 0;

    // Validation errors (1xxx)
    pub const VALIDATION_FAILED: i32 = 1001;
    pub const REMARK_REQUIRED: i32 = 1002;
    pub const INSUFFICIENT_BALANCE: i32 = 1003;

    // Authority errors (2xxx)
    pub const NO_AUTHORITY: i32 = 2001;
    pub const FORBIDDEN: i32 = 2002;

    // Precondition errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;
    pub const ALREADY_DECIDED: i32 = 4009;
    pub const PENDING_EXISTS: i32 = 4010;
    pub const RECONCILIATION_REQUIRED: i32 = 4011;

    // Upstream and server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const PERSISTENCE_ERROR: i32 = 5001;
    pub const UPSTREAM_ERROR: i32 = 5002;
    pub const UPSTREAM_UNKNOWN: i32 = 5003;

    pub fn for_error(err: &ApprovalError) -> i32 {
        match err {
            ApprovalError::Validation(_) => VALIDATION_FAILED,
            ApprovalError::RemarkRequired => REMARK_REQUIRED,
            ApprovalError::InsufficientBalance { .. } => INSUFFICIENT_BALANCE,
            ApprovalError::NoAuthority => NO_AUTHORITY,
            ApprovalError::Forbidden { .. } => FORBIDDEN,
            ApprovalError::NotFound(_) => NOT_FOUND,
            ApprovalError::AlreadyApproved(_) | ApprovalError::AlreadyRejected(_) => {
                ALREADY_DECIDED
            }
            ApprovalError::PendingExists { .. } => PENDING_EXISTS,
            ApprovalError::ReconciliationRequired(_) => RECONCILIATION_REQUIRED,
            ApprovalError::Upstream(_) => UPSTREAM_ERROR,
            ApprovalError::UpstreamUnknown(_) => UPSTREAM_UNKNOWN,
            ApprovalError::Persistence(_) => PERSISTENCE_ERROR,
            ApprovalError::Database(_) => INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let resp: ApiResponse<i64> = Ok(7).into();
        assert!(resp.is_success());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, serde_json::json!({"code": 0, "msg": "ok", "data": 7}));
    }

    #[test]
    fn test_error_envelope_hides_upstream_detail() {
        let resp: ApiResponse<i64> =
            Err(ApprovalError::UpstreamUnknown("tcp reset by peer".into())).into();
        assert!(!resp.is_success());
        assert_eq!(resp.code, error_codes::UPSTREAM_UNKNOWN);
        assert_eq!(resp.status, 503);
        assert!(!resp.msg.contains("tcp"));

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("data").is_none());
        assert!(json.get("status").is_none());
    }
}
