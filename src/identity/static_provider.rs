//! Identity provider backed by a fixed credential table.
//!
//! Intended for development, tests and single-tenant deployments.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{AuthError, Identity, IdentityProvider, StaticIdentityConfig};

#[derive(Debug, Clone)]
struct Entry {
    identity: Identity,
    expired: bool,
}

/// Looks credentials up in an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    entries: HashMap<String, Entry>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &StaticIdentityConfig) -> Self {
        config
            .credentials
            .iter()
            .fold(Self::new(), |provider, cred| {
                let identity = Identity::new(cred.account_id.as_str(), cred.email.as_str());
                if cred.expired {
                    provider.with_expired(&cred.token, identity)
                } else {
                    provider.with_credential(&cred.token, identity)
                }
            })
    }

    /// Accept `token` as `identity`.
    pub fn with_credential(mut self, token: &str, identity: Identity) -> Self {
        self.entries.insert(
            token.to_string(),
            Entry {
                identity,
                expired: false,
            },
        );
        self
    }

    /// Recognise `token` but reject it as expired.
    pub fn with_expired(mut self, token: &str, identity: Identity) -> Self {
        self.entries.insert(
            token.to_string(),
            Entry {
                identity,
                expired: true,
            },
        );
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        match self.entries.get(credential) {
            Some(entry) if entry.expired => Err(AuthError::Expired),
            Some(entry) => Ok(entry.identity.clone()),
            None => Err(AuthError::Invalid),
        }
    }
}
