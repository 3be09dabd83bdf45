//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::QuotaStatus;
use crate::model::{RecipientMeta, Token, TokenStatus};
use crate::services::IssuedLink;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierRequest {
    pub tier: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Quota view of the caller's account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub account_id: String,
    pub email: String,
    pub tier: String,
    pub limit: u32,
    pub issued: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub registered: bool,
}

impl From<QuotaStatus> for QuotaResponse {
    fn from(status: QuotaStatus) -> Self {
        Self {
            account_id: status.account_id.to_string(),
            email: status.email,
            tier: status.tier,
            limit: status.limit,
            issued: status.issued,
            remaining: status.remaining,
            reset_at: status.period_reset_at,
            registered: status.registered,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedLinkResponse {
    pub link_id: String,
    pub url: String,
    pub remaining: u32,
    pub limit: u32,
}

impl IssuedLinkResponse {
    pub fn new(link: &IssuedLink, public_base_url: &str) -> Self {
        Self {
            link_id: link.token.token_id.to_string(),
            url: upload_url(public_base_url, &link.token),
            remaining: link.remaining,
            limit: link.limit,
        }
    }
}

/// A token as shown to its owner or to the recipient opening the link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub link_id: String,
    pub url: String,
    pub status: TokenStatus,
    pub recipient: RecipientMeta,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl LinkResponse {
    pub fn new(token: Token, public_base_url: &str) -> Self {
        Self {
            link_id: token.token_id.to_string(),
            url: upload_url(public_base_url, &token),
            status: token.status(),
            images: token.images().map(|pair| pair.as_slice().to_vec()).unwrap_or_default(),
            redeemed_at: token.redeemed_at(),
            created_at: token.created_at,
            recipient: token.recipient,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinksResponse {
    pub links: Vec<LinkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedeemResponse {
    pub images: Vec<String>,
}

fn upload_url(public_base_url: &str, token: &Token) -> String {
    format!(
        "{}/upload/{}",
        public_base_url.trim_end_matches('/'),
        token.token_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImagePair;

    #[test]
    fn test_link_response_shape() {
        let mut token = Token::issue("acct".into(), RecipientMeta::default(), Utc::now());
        let unused = serde_json::to_value(LinkResponse::new(token.clone(), "https://p.example/"))
            .unwrap();
        assert_eq!(unused["status"], "unused");
        assert_eq!(unused["images"].as_array().unwrap().len(), 0);
        assert!(unused.get("redeemedAt").is_none());
        assert_eq!(
            unused["url"],
            format!("https://p.example/upload/{}", token.token_id)
        );

        token.settle(ImagePair::new("u1", "u2"), Utc::now());
        let used = serde_json::to_value(LinkResponse::new(token, "https://p.example")).unwrap();
        assert_eq!(used["status"], "used");
        assert_eq!(used["images"], serde_json::json!(["u1", "u2"]));
        assert!(used["redeemedAt"].is_string());
    }
}
