//! Maker-checker approval engine
//!
//! Proposed gateway changes (rate plans, app attributes, wallet
//! transactions, KVM entries) move from PENDING to APPROVED or REJECTED.
//! An effective approval is mirrored to the gateway control plane before it
//! is recorded.
//!
//! # Modules
//!
//! - [`payload`] - typed per-domain change payloads and validation
//! - [`types`] - change request records and store parameters
//! - [`state`] - approval state machine states
//! - [`store`] - persistence contract with conditional terminal writes
//! - [`workflow`] - submit / approve / reject orchestration
//! - [`audit`] - audit trail of terminal outcomes
//! - [`response`] - uniform result envelope

pub mod audit;
pub mod db;
pub mod error;
pub mod hook;
pub mod memory;
pub mod payload;
pub mod response;
pub mod state;
pub mod store;
pub mod types;
pub mod workflow;


pub use audit::{AuditEntry, AuditEvent, AuditTrail, TracingAuditTrail};
pub use db::PgChangeRequestStore;
pub use error::ApprovalError;
pub use hook::SyncHook;
pub use memory::MemoryChangeRequestStore;
pub use payload::ChangePayload;
pub use response::ApiResponse;
pub use state::ApprovalState;
pub use store::ChangeRequestStore;
pub use types::{ChangeDomain, ChangeRequest, ChangeRequestId, ListQuery};
pub use workflow::ApprovalWorkflow;
