//! Change request types
//!
//! A [`ChangeRequest`] is the unit of maker-checker review. Its payload is a
//! typed [`ChangePayload`]; JSON text only appears inside the Pg store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::payload::ChangePayload;
use super::state::ApprovalState;

/// Surrogate key, BIGSERIAL in PostgreSQL
pub type ChangeRequestId = i64;

/// Which gateway resource family a change belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum ChangeDomain {
    RatePlan = 1,
    AppAttributes = 2,
    WalletTransaction = 3,
    KvmEntry = 4,
}

impl ChangeDomain {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(ChangeDomain::RatePlan),
            2 => Some(ChangeDomain::AppAttributes),
            3 => Some(ChangeDomain::WalletTransaction),
            4 => Some(ChangeDomain::KvmEntry),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeDomain::RatePlan => "rate_plan",
            ChangeDomain::AppAttributes => "app_attributes",
            ChangeDomain::WalletTransaction => "wallet_transaction",
            ChangeDomain::KvmEntry => "kvm_entry",
        }
    }
}

impl fmt::Display for ChangeDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rate_plan" => Ok(ChangeDomain::RatePlan),
            "app_attributes" => Ok(ChangeDomain::AppAttributes),
            "wallet_transaction" => Ok(ChangeDomain::WalletTransaction),
            "kvm_entry" => Ok(ChangeDomain::KvmEntry),
            other => Err(format!("unknown change domain: {other}")),
        }
    }
}

/// Checker verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

/// Who decided, when, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub by: String,
    pub at: DateTime<Utc>,
    pub remark: String,
}

impl Decision {
    pub fn now(by: &str, remark: &str) -> Self {
        Self {
            by: by.to_string(),
            at: Utc::now(),
            remark: remark.to_string(),
        }
    }
}

/// The single terminal decision of a change request
///
/// Approval and rejection share one slot, so a record cannot carry both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerDecision {
    pub verdict: Verdict,
    #[serde(flatten)]
    pub decision: Decision,
}

/// A proposed change and its maker-checker trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: ChangeRequestId,
    pub subject_ref: String,
    pub payload: ChangePayload,
    pub maker_by: String,
    pub maker_at: DateTime<Utc>,
    pub maker_approved: bool,
    pub checker: Option<CheckerDecision>,
    /// Gateway canonical name once synchronized, empty before
    pub external_ref: String,
    pub external_raw_response: Option<String>,
    /// Wallet transactions only: balance right before the transaction was applied
    pub previous_balance: Option<Decimal>,
    /// A gateway write was sent but its outcome never came back
    #[serde(default)]
    pub sync_unconfirmed: bool,
}

impl ChangeRequest {
    pub fn domain(&self) -> ChangeDomain {
        self.payload.domain()
    }

    pub fn state(&self) -> ApprovalState {
        match self.checker.as_ref().map(|c| c.verdict) {
            None => ApprovalState::Pending,
            Some(Verdict::Approved) => ApprovalState::Approved,
            Some(Verdict::Rejected) => ApprovalState::Rejected,
        }
    }

    pub fn checker_approved(&self) -> bool {
        self.state() == ApprovalState::Approved
    }

    pub fn checker_rejected(&self) -> bool {
        self.state() == ApprovalState::Rejected
    }

    pub fn is_pending(&self) -> bool {
        self.state() == ApprovalState::Pending
    }

    /// Fill in the fields the conditional approve update writes
    pub fn apply_commit(&mut self, commit: &ApprovalCommit) {
        self.checker = Some(CheckerDecision {
            verdict: Verdict::Approved,
            decision: commit.decision.clone(),
        });
        self.external_ref = commit.external_ref.clone();
        self.external_raw_response = Some(commit.raw_response.clone());
        self.previous_balance = commit.previous_balance;
    }
}

/// Insert parameters; `approval` is set only for the fused Admin submit
#[derive(Debug, Clone)]
pub struct NewChangeRequest {
    pub payload: ChangePayload,
    pub maker_by: String,
    pub maker_at: DateTime<Utc>,
    pub maker_approved: bool,
    pub approval: Option<ApprovalCommit>,
}

/// Everything written by the single conditional approve update
#[derive(Debug, Clone)]
pub struct ApprovalCommit {
    pub decision: Decision,
    pub external_ref: String,
    pub raw_response: String,
    pub previous_balance: Option<Decimal>,
}

/// Filter for queue views; results are always newest id first
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub domain: Option<ChangeDomain>,
    pub state: Option<ApprovalState>,
    pub limit: i64,
    pub offset: i64,
}

impl ListQuery {
    pub fn pending(domain: ChangeDomain) -> Self {
        Self {
            domain: Some(domain),
            state: Some(ApprovalState::Pending),
            ..Self::default()
        }
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            domain: None,
            state: None,
            limit: 50,
            offset: 0,
        }
    }
}
