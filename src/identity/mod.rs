//! Caller authentication.
//!
//! An [`IdentityProvider`] turns a bearer credential into a verified
//! [`Identity`]. The HTTP edge extracts the credential from the
//! `Authorization` header and hands the identity to the services; nothing
//! below the edge sees raw credentials.

mod http;
mod static_provider;

pub use self::http::HttpIdentityProvider;
pub use static_provider::StaticIdentityProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ledger::AccountSeed;
use crate::model::AccountId;

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account_id: AccountId,
    pub email: String,
}

impl Identity {
    pub fn new(account_id: impl Into<AccountId>, email: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            email: email.into(),
        }
    }

    /// Seed used to create the account on first use.
    pub fn seed(&self) -> AccountSeed {
        AccountSeed::new(self.account_id.clone(), self.email.clone())
    }
}

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid credential")]
    Invalid,

    #[error("Credential expired")]
    Expired,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Verifies bearer credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Extract the credential from an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// ============================================================================
// Configuration
// ============================================================================

/// Identity provider type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    /// Fixed credential table from configuration.
    #[default]
    Static,
    /// Remote verification endpoint.
    Http,
}

/// Identity provider configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    #[serde(rename = "static")]
    pub static_credentials: StaticIdentityConfig,
    pub http: HttpIdentityConfig,
}

/// Credential table for the static provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StaticIdentityConfig {
    pub credentials: Vec<StaticCredential>,
}

/// One accepted bearer credential.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticCredential {
    pub token: String,
    pub account_id: String,
    pub email: String,
    /// Reject this credential as expired.
    #[serde(default)]
    pub expired: bool,
}

/// Remote verification endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpIdentityConfig {
    /// Receives `POST` with the caller's `Authorization` header.
    pub verify_url: String,
}

impl Default for HttpIdentityConfig {
    fn default() -> Self {
        Self {
            verify_url: "http://localhost:9000/verify".to_string(),
        }
    }
}

/// Initialize the identity provider based on configuration.
pub fn init_identity(
    config: &IdentityConfig,
    timeout: Duration,
) -> Result<Arc<dyn IdentityProvider>, Box<dyn std::error::Error>> {
    match config.identity_type {
        IdentityType::Static => {
            info!(
                credentials = config.static_credentials.credentials.len(),
                "Identity: static"
            );
            Ok(Arc::new(StaticIdentityProvider::from_config(
                &config.static_credentials,
            )))
        }
        IdentityType::Http => {
            info!(url = %config.http.verify_url, "Identity: http");
            Ok(Arc::new(HttpIdentityProvider::new(
                &config.http.verify_url,
                timeout,
            )?))
        }
    }
}
