//! Identity provider that delegates to a remote verification endpoint.
//!
//! The caller's credential is forwarded as `Authorization: Bearer ...` in a
//! `POST` to `verify_url`. Responses:
//! - `200` with `{"account_id": ..., "email": ...}`: verified
//! - `401` with `{"code": "expired"}`: expired; any other `401`/`403`: invalid
//! - anything else, or no response: provider unavailable

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{AuthError, Identity, IdentityProvider};

#[derive(Debug, Deserialize)]
struct VerifiedBody {
    #[serde(alias = "accountId", alias = "uid")]
    account_id: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Default, Deserialize)]
struct RejectedBody {
    #[serde(default)]
    code: String,
}

/// Remote credential verification over HTTP.
pub struct HttpIdentityProvider {
    client: Client,
    verify_url: String,
}

impl HttpIdentityProvider {
    /// Create a provider whose calls are bounded by `timeout`.
    pub fn new(verify_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            verify_url: verify_url.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .post(&self.verify_url)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.verify_url, error = %e, "Identity provider request failed");
                AuthError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body: VerifiedBody = response
                    .json()
                    .await
                    .map_err(|e| AuthError::Unavailable(format!("malformed response: {}", e)))?;
                debug!(account_id = %body.account_id, "Credential verified");
                Ok(Identity::new(body.account_id, body.email))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body: RejectedBody = response.json().await.unwrap_or_default();
                if body.code.eq_ignore_ascii_case("expired") {
                    Err(AuthError::Expired)
                } else {
                    Err(AuthError::Invalid)
                }
            }
            other => {
                warn!(url = %self.verify_url, status = %other, "Identity provider returned unexpected status");
                Err(AuthError::Unavailable(format!("HTTP {}", other)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    async fn verify_handler(headers: HeaderMap) -> axum::response::Response {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        match auth {
            "Bearer good" => Json(json!({"accountId": "acct-1", "email": "one@example.com"}))
                .into_response(),
            "Bearer old" => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"code": "expired"})),
            )
                .into_response(),
            "Bearer flaky" => StatusCode::BAD_GATEWAY.into_response(),
            _ => StatusCode::UNAUTHORIZED.into_response(),
        }
    }

    async fn spawn_verifier() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/verify", post(verify_handler));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/verify", addr)
    }

    #[tokio::test]
    async fn test_verify_against_endpoint() {
        let url = spawn_verifier().await;
        let provider = HttpIdentityProvider::new(url, Duration::from_secs(5)).unwrap();

        let identity = provider.verify("good").await.unwrap();
        assert_eq!(identity, Identity::new("acct-1", "one@example.com"));

        assert_eq!(provider.verify("old").await, Err(AuthError::Expired));
        assert_eq!(provider.verify("forged").await, Err(AuthError::Invalid));
        assert!(matches!(
            provider.verify("flaky").await,
            Err(AuthError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let provider =
            HttpIdentityProvider::new("http://127.0.0.1:1/verify", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            provider.verify("good").await,
            Err(AuthError::Unavailable(_))
        ));
    }
}
