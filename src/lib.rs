//! Gateway Admin - maker-checker control plane for an API gateway
//!
//! Operators propose changes to gateway resources (rate plans, developer app
//! attributes, wallet credits/debits, key-value map entries). A checker
//! approves or rejects them; approved changes are pushed to the gateway's
//! management API before they are recorded.
//!
//! # Modules
//!
//! - [`approval`] - change requests, state machine and workflow
//! - [`role`] - Admin / Checker / Maker authority resolution
//! - [`gateway`] - gateway management API client and outcome classification
//! - [`credential`] - OAuth2 bearer token broker with durable cache
//! - [`wallet`] - developer wallet credits, debits and balance cache
//! - [`money`] - decimal amounts and the gateway money wire format
//! - [`service`] - production wiring
//! - [`config`] / [`logging`] / [`db`] - ambient infrastructure

// Infrastructure
pub mod config;
pub mod db;
pub mod logging;

// Domain
pub mod approval;
pub mod credential;
pub mod gateway;
pub mod money;
pub mod role;
pub mod wallet;

pub mod service;

// Convenient re-exports at crate root
pub use approval::{
    ApiResponse, ApprovalError, ApprovalState, ApprovalWorkflow, ChangeDomain, ChangePayload,
    ChangeRequest, ChangeRequestId, ChangeRequestStore, ListQuery, MemoryChangeRequestStore,
    PgChangeRequestStore,
};
pub use config::AppConfig;
pub use credential::{CachedToken, CredentialBroker, CredentialError};
pub use gateway::{GatewayError, GatewaySync, HttpGatewaySync, SyncOutcome};
pub use role::{Role, RoleResolver};
pub use service::AdminServices;
pub use wallet::WalletLedger;
