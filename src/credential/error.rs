use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    #[error("Identity provider request failed: {0}")]
    Http(String),

    #[error("Identity provider refused token request: HTTP {status} - {body}")]
    Refused { status: u16, body: String },

    #[error("Malformed token response: {0}")]
    Malformed(String),

    #[error("Token storage error: {0}")]
    Storage(String),
}

impl CredentialError {
    pub fn code(&self) -> &'static str {
        match self {
            CredentialError::Http(_) => "IDENTITY_UNREACHABLE",
            CredentialError::Refused { .. } => "IDENTITY_REFUSED",
            CredentialError::Malformed(_) => "IDENTITY_MALFORMED",
            CredentialError::Storage(_) => "TOKEN_STORAGE_ERROR",
        }
    }
}

impl From<sqlx::Error> for CredentialError {
    fn from(e: sqlx::Error) -> Self {
        CredentialError::Storage(e.to_string())
    }
}
