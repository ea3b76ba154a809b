//! Gateway response classification

use rust_decimal::Decimal;
use serde::Deserialize;

/// A change the gateway accepted
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Gateway canonical name of the created or updated resource
    pub external_ref: String,
    pub raw_response: String,
    /// Wallet transactions: authoritative balance after the transaction
    pub balance: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Applied(Applied),
    /// `ABORTED`/409: the gateway already holds this change
    AlreadyApplied { raw_response: String },
    /// Structured refusal; `message` is shown to the user
    Rejected {
        message: String,
        raw_response: String,
    },
    /// Transport failure or unstructured answer; effect on the gateway unknown
    Unknown { message: String },
}

impl SyncOutcome {
    /// Applied or already applied: the record may be approved
    pub fn is_effective(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Applied(_) | SyncOutcome::AlreadyApplied { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Applied(_) => "applied",
            SyncOutcome::AlreadyApplied { .. } => "already_applied",
            SyncOutcome::Rejected { .. } => "rejected",
            SyncOutcome::Unknown { .. } => "unknown",
        }
    }
}

/// `{ "error": { "status", "code", "message" } }`
#[derive(Debug, Deserialize)]
pub struct GatewayErrorBody {
    pub error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct GatewayErrorDetail {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl GatewayErrorDetail {
    pub fn is_idempotent_conflict(&self) -> bool {
        self.status == "ABORTED" && self.code == 409
    }
}

/// Classify a non-2xx gateway answer
pub fn classify_error(http_status: u16, body: &str) -> SyncOutcome {
    match serde_json::from_str::<GatewayErrorBody>(body) {
        Ok(parsed) if parsed.error.is_idempotent_conflict() => SyncOutcome::AlreadyApplied {
            raw_response: body.to_string(),
        },
        Ok(parsed) if !parsed.error.message.is_empty() => SyncOutcome::Rejected {
            message: parsed.error.message,
            raw_response: body.to_string(),
        },
        _ => SyncOutcome::Unknown {
            message: format!("HTTP {http_status}: {}", truncate(body, 512)),
        },
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
