//! HTTP client for the photolink API.

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ApiFailure, ClientError, Result};
use crate::types::{
    Issuance, IssuedLink, Link, QuotaStatus, Recipient, Redemption, Registration, TierSelection,
    UploadImage,
};

#[derive(Deserialize)]
struct LinksBody {
    links: Vec<Link>,
}

#[derive(Deserialize)]
struct RedeemBody {
    images: Vec<String>,
}

/// Client for a photolink server.
#[derive(Debug, Clone)]
pub struct PhotolinkClient {
    http: reqwest::Client,
    base_url: String,
    credential: Option<String>,
}

impl PhotolinkClient {
    /// Create a client for the server at `base_url`, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidArgument(format!(
                "base url must be http(s): {}",
                base_url
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: None,
        })
    }

    /// Connect using a base URL from environment variable with fallback.
    pub fn from_env(env_var: &str, default: &str) -> Result<Self> {
        let base_url = std::env::var(env_var).unwrap_or_else(|_| default.to_string());
        Self::new(base_url)
    }

    /// Send `credential` as a bearer token on authenticated calls.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn health(&self) -> Result<bool> {
        let response = self.http.get(self.url("/api/health")).send().await?;
        Ok(response.status().is_success())
    }

    /// Register the caller's account, optionally on a specific tier.
    pub async fn register(&self, tier: Option<&str>) -> Result<Registration> {
        let body = serde_json::json!({ "tier": tier });
        let response = self
            .authed(self.http.post(self.url("/api/accounts")))?
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::CREATED {
            return Ok(Registration::Registered(response.json().await?));
        }
        match failure(response).await? {
            (_, f) if f.code == "already_registered" => Ok(Registration::AlreadyRegistered),
            (_, f) if f.code == "unknown_tier" => Ok(Registration::UnknownTier),
            (status, failure) => Err(ClientError::Api { status, failure }),
        }
    }

    /// Current allowance for the caller.
    pub async fn quota(&self) -> Result<QuotaStatus> {
        let response = self
            .authed(self.http.get(self.url("/api/accounts/me")))?
            .send()
            .await?;
        decode(response).await
    }

    pub async fn select_tier(&self, tier: &str) -> Result<TierSelection> {
        let response = self
            .authed(self.http.put(self.url("/api/accounts/me/tier")))?
            .json(&serde_json::json!({ "tier": tier }))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(TierSelection::Changed(response.json().await?));
        }
        match failure(response).await? {
            (_, f) if f.code == "unknown_tier" => Ok(TierSelection::UnknownTier),
            (_, f) if f.code == "not_registered" => Ok(TierSelection::NotRegistered),
            (status, failure) => Err(ClientError::Api { status, failure }),
        }
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Issue an upload link for `recipient`.
    pub async fn issue_link(&self, recipient: &Recipient) -> Result<Issuance> {
        let response = self
            .authed(self.http.post(self.url("/api/links")))?
            .json(recipient)
            .send()
            .await?;

        if response.status() == StatusCode::CREATED {
            let link: IssuedLink = response.json().await?;
            debug!(link_id = %link.link_id, remaining = link.remaining, "Link issued");
            return Ok(Issuance::Issued(link));
        }
        match failure(response).await? {
            (429, failure) => {
                let details = failure.details.unwrap_or_default();
                Ok(Issuance::Denied {
                    limit: details["limit"].as_u64().unwrap_or_default() as u32,
                    reset_at: details["resetAt"]
                        .as_str()
                        .and_then(|s| s.parse().ok()),
                })
            }
            (status, failure) => Err(ClientError::Api { status, failure }),
        }
    }

    /// The caller's links, newest first.
    pub async fn links(&self) -> Result<Vec<Link>> {
        let response = self
            .authed(self.http.get(self.url("/api/links")))?
            .send()
            .await?;
        let body: LinksBody = decode(response).await?;
        Ok(body.links)
    }

    /// Public view of one link; `None` if it does not exist.
    pub async fn link(&self, link_id: &str) -> Result<Option<Link>> {
        let response = self
            .http
            .get(self.url(&format!("/api/links/{}", link_id)))
            .send()
            .await?;
        if response.status() == StatusCode::GONE {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    /// Submit the two images for a link. No credential is sent.
    pub async fn redeem(
        &self,
        link_id: &str,
        first: UploadImage,
        second: UploadImage,
    ) -> Result<Redemption> {
        let form = Form::new()
            .part("image1", image_part(first)?)
            .part("image2", image_part(second)?);
        let response = self
            .http
            .post(self.url(&format!("/api/links/{}/redeem", link_id)))
            .multipart(form)
            .send()
            .await?;

        if response.status().is_success() {
            let body: RedeemBody = response.json().await?;
            return Ok(Redemption::Redeemed(body.images));
        }
        match failure(response).await? {
            (410, _) => Ok(Redemption::Expired),
            (409, _) => Ok(Redemption::AlreadyUsed),
            (502, failure) => Ok(Redemption::UploadFailed {
                image: failure
                    .details
                    .as_ref()
                    .and_then(|d| d["image"].as_u64())
                    .unwrap_or_default() as u32,
                retryable: failure.retryable,
                message: failure.error,
            }),
            (status, failure) => Err(ClientError::Api { status, failure }),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let credential = self
            .credential
            .as_deref()
            .ok_or(ClientError::MissingCredential)?;
        Ok(request.bearer_auth(credential))
    }
}

fn image_part(image: UploadImage) -> Result<Part> {
    Part::bytes(image.bytes)
        .file_name(image.file_name)
        .mime_str(&image.content_type)
        .map_err(|e| ClientError::InvalidArgument(format!("content type: {}", e)))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if response.status().is_success() {
        return Ok(response.json().await?);
    }
    let (status, failure) = failure(response).await?;
    Err(ClientError::Api { status, failure })
}

async fn failure(response: Response) -> Result<(u16, ApiFailure)> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    let failure = serde_json::from_str(&text).unwrap_or_else(|_| ApiFailure {
        error: text,
        ..Default::default()
    });
    Ok((status, failure))
}
