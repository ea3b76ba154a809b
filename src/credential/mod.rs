//! Gateway credentials
//!
//! - [`CredentialBroker`]: single authority for bearer token validity
//! - [`TokenStore`]: durable token cache shared across processes
//! - [`IdentityProvider`]: OAuth2 client-credentials token source

pub mod broker;
pub mod error;
pub mod provider;
pub mod store;
pub mod token;

pub use broker::CredentialBroker;
pub use error::CredentialError;
pub use provider::{HttpIdentityProvider, IdentityProvider};
pub use store::{MemoryTokenStore, PgTokenStore, TokenStore};
pub use token::CachedToken;
