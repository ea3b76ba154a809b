//! Service wiring
//!
//! Builds the production object graph from [`AppConfig`]: PostgreSQL-backed
//! stores, the credential broker, the HTTP gateway client, the approval
//! workflow and the wallet ledger.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::approval::{ApprovalWorkflow, PgChangeRequestStore, TracingAuditTrail};
use crate::approval::types::ChangeDomain;
use crate::config::AppConfig;
use crate::credential::{CredentialBroker, HttpIdentityProvider, PgTokenStore};
use crate::db::Database;
use crate::gateway::HttpGatewaySync;
use crate::role::{PgRoleDirectory, RoleResolver};
use crate::wallet::{PgWalletBalanceStore, WalletGuard, WalletLedger};

/// Everything the admin console needs, wired once at startup
pub struct AdminServices {
    pub db: Database,
    pub broker: Arc<CredentialBroker>,
    pub gateway: Arc<HttpGatewaySync>,
    pub roles: Arc<PgRoleDirectory>,
    pub workflow: Arc<ApprovalWorkflow>,
    pub wallet: WalletLedger,
}

impl AdminServices {
    /// Connect, migrate and wire
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let url = config.postgres_url()?;
        let db = Database::connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        db.migrate().await.context("Failed to apply migrations")?;
        Self::build(config, db)
    }

    /// Wire over an existing pool; no I/O happens here
    pub fn build(config: &AppConfig, db: Database) -> Result<Self> {
        let provider = HttpIdentityProvider::new(config.identity.clone())
            .context("Failed to build identity provider client")?;
        let broker = Arc::new(CredentialBroker::new(
            Arc::new(PgTokenStore::new(db.clone())),
            Arc::new(provider),
            config.identity.refresh_margin_secs,
        ));

        let gateway = Arc::new(
            HttpGatewaySync::new(&config.gateway, broker.clone())
                .context("Failed to build gateway client")?,
        );

        let roles = Arc::new(PgRoleDirectory::new(db.clone()));
        let balances = Arc::new(PgWalletBalanceStore::new(db.clone()));

        let workflow = Arc::new(
            ApprovalWorkflow::builder(
                Arc::new(PgChangeRequestStore::new(db.clone())),
                RoleResolver::new(roles.clone()),
                gateway.clone(),
            )
            .audit(Arc::new(TracingAuditTrail))
            .hook(
                ChangeDomain::WalletTransaction,
                Arc::new(WalletGuard::new(gateway.clone(), balances.clone())),
            )
            .single_flight(config.workflow.single_flight.iter().copied())
            .build(),
        );
        let wallet = WalletLedger::new(workflow.clone(), balances);

        tracing::info!(
            gateway = %config.gateway.base_url,
            single_flight = ?config.workflow.single_flight,
            "Admin services wired"
        );

        Ok(Self {
            db,
            broker,
            gateway,
            roles,
            workflow,
            wallet,
        })
    }
}
