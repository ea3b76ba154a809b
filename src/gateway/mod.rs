//! Gateway control plane synchronization
//!
//! - [`GatewaySync`]: adapter contract used by the approval workflow
//! - [`HttpGatewaySync`]: reqwest implementation
//! - [`SyncOutcome`]: classified result of a write
//!
//! Requests POST when no gateway name is known yet and PUT against the
//! existing name when updating.

pub mod client;
pub mod error;
pub mod outcome;
pub mod requests;

pub use client::HttpGatewaySync;
pub use error::GatewayError;
pub use outcome::{Applied, SyncOutcome};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::approval::payload::ChangePayload;

#[async_trait]
pub trait GatewaySync: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    /// Push an approved change; never retried internally
    async fn apply(&self, payload: &ChangePayload) -> SyncOutcome;

    /// Authoritative wallet balance for one currency
    async fn wallet_balance(
        &self,
        developer_email: &str,
        currency_code: &str,
    ) -> Result<Decimal, GatewayError>;
}
