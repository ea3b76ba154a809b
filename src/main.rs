//! Gateway Admin - operator entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Maker   │───▶│ Pending  │───▶│ Checker  │───▶│ Gateway  │
//! │ (submit) │    │  (Pg)    │    │(approve) │    │  (sync)  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Usage:
//!
//! - `gateway-admin --env prod` : connect, migrate, health check
//! - `gateway-admin --check-token` : force a fresh gateway bearer token
//! - `gateway-admin --pending rate_plan` : print the pending queue of a domain

use anyhow::{Context, Result};

use gateway_admin::approval::types::{ChangeDomain, ListQuery};
use gateway_admin::config::AppConfig;
use gateway_admin::logging::init_logging;
use gateway_admin::service::AdminServices;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn use_check_token_mode() -> bool {
    std::env::args().any(|a| a == "--check-token")
}

/// Domain given to --pending, if any
fn get_pending_domain() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--pending" && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).context("Failed to load configuration")?;
    let _log_guard = init_logging(&app_config);

    tracing::info!("Starting gateway admin in {} mode", env);

    let services = AdminServices::connect(&app_config).await?;
    services
        .db
        .health_check()
        .await
        .context("PostgreSQL health check failed")?;

    if use_check_token_mode() {
        let token = services
            .broker
            .refresh()
            .await
            .context("Failed to obtain gateway token")?;
        println!("Gateway token valid until {}", token.expires_at);
        return Ok(());
    }

    if let Some(domain) = get_pending_domain() {
        let domain: ChangeDomain = domain.parse().map_err(anyhow::Error::msg)?;
        let pending = services.workflow.list(&ListQuery::pending(domain)).await?;
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }

    println!("Gateway admin ready ({env})");
    Ok(())
}
