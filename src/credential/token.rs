use chrono::{DateTime, Duration, Utc};

use super::error::CredentialError;

/// Gateway bearer token with its recorded expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Token issued now that expires in `expires_in_secs`
    ///
    /// A non-positive or out-of-range lifetime is a malformed provider answer.
    pub fn new(access_token: impl Into<String>, expires_in_secs: i64) -> Result<Self, CredentialError> {
        if expires_in_secs <= 0 {
            return Err(CredentialError::Malformed(format!(
                "expires_in must be positive, got {expires_in_secs}"
            )));
        }
        let expires_at = Duration::try_seconds(expires_in_secs)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                CredentialError::Malformed(format!("expires_in out of range: {expires_in_secs}"))
            })?;
        Ok(Self {
            access_token: access_token.into(),
            expires_at,
        })
    }

    /// Usable at `now` when at least `margin` remains before expiry
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}
