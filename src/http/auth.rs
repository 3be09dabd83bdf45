//! Bearer authentication extractor.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use super::{ApiError, AppState};
use crate::identity::{bearer_token, AuthError, Identity};

/// A caller verified by the configured identity provider.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AuthError::MissingCredential)?;

        let verified =
            tokio::time::timeout(state.timeouts.identity, state.identity.verify(credential))
                .await
                .map_err(|_| AuthError::Unavailable("verification timed out".to_string()))?;

        match verified {
            Ok(identity) => Ok(Self(identity)),
            Err(e) => {
                debug!(error = %e, "Rejected credential");
                Err(e.into())
            }
        }
    }
}
