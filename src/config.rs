use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use thiserror::Error;

use crate::approval::types::ChangeDomain;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// PostgreSQL connection URL for change requests, roles and the token cache
    #[serde(default)]
    pub postgres_url: Option<String>,
}

/// Gateway control plane endpoint
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// e.g. `https://apigee.googleapis.com/v1/organizations/acme`
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdentityConfig {
    pub token_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Tokens are treated as expired this many seconds before their recorded expiry
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkflowConfig {
    /// Domains that refuse a new submission while one is still pending for the same subject
    pub single_flight: BTreeSet<ChangeDomain>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            single_flight: [ChangeDomain::RatePlan, ChangeDomain::WalletTransaction]
                .into_iter()
                .collect(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_refresh_margin_secs() -> i64 {
    300
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Secrets are usually injected through the environment rather than committed yaml
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GATEWAY_CLIENT_ID") {
            self.identity.client_id = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_CLIENT_SECRET") {
            self.identity.client_secret = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.postgres_url = Some(v);
        }
    }

    pub fn postgres_url(&self) -> Result<&str, ConfigError> {
        self.postgres_url
            .as_deref()
            .ok_or(ConfigError::Missing("postgres_url"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
log_level: "info"
log_dir: "./logs"
log_file: "gateway-admin.log"
use_json: false
rotation: "daily"
gateway:
  base_url: "https://gateway.example.com/v1/organizations/acme"
identity:
  token_url: "https://login.example.com/oauth/token"
  client_id: "admin-console"
  client_secret: "s3cret"
postgres_url: "postgres://localhost/gateway_admin"
"#;

    #[test]
    fn test_app_config_deserialize_with_defaults() {
        let config = AppConfig::from_yaml(YAML).unwrap();

        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.identity.refresh_margin_secs, 300);
        assert_eq!(config.identity.client_id, "admin-console");
        assert!(
            config
                .workflow
                .single_flight
                .contains(&ChangeDomain::WalletTransaction)
        );
        assert!(
            !config
                .workflow
                .single_flight
                .contains(&ChangeDomain::AppAttributes)
        );
        assert_eq!(
            config.postgres_url().unwrap(),
            "postgres://localhost/gateway_admin"
        );
    }

    #[test]
    fn test_workflow_single_flight_override() {
        let yaml = format!("{YAML}workflow:\n  single_flight: [\"kvm_entry\"]\n");
        let config = AppConfig::from_yaml(&yaml).unwrap();

        assert_eq!(config.workflow.single_flight.len(), 1);
        assert!(config.workflow.single_flight.contains(&ChangeDomain::KvmEntry));
    }

    #[test]
    fn test_missing_postgres_url() {
        let yaml = YAML.replace("postgres_url: \"postgres://localhost/gateway_admin\"\n", "");
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert!(matches!(
            config.postgres_url(),
            Err(ConfigError::Missing("postgres_url"))
        ));
    }
}
