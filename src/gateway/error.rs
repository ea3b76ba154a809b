use thiserror::Error;

use crate::approval::error::ApprovalError;
use crate::credential::CredentialError;

/// Failures of gateway reads (balance lookups); writes report a `SyncOutcome`
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Invalid gateway url: {0}")]
    Url(String),

    #[error("Gateway request failed: {0}")]
    Http(String),

    #[error("Gateway answered HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed gateway response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Url(_) => "GATEWAY_URL_INVALID",
            GatewayError::Http(_) => "GATEWAY_UNREACHABLE",
            GatewayError::Status { .. } => "GATEWAY_ERROR",
            GatewayError::Malformed(_) => "GATEWAY_MALFORMED",
            GatewayError::Credential(e) => e.code(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Http(e.to_string())
    }
}

impl From<GatewayError> for ApprovalError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Status { message, .. } => ApprovalError::Upstream(message),
            other => ApprovalError::UpstreamUnknown(other.to_string()),
        }
    }
}
