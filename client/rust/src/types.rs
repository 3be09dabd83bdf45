//! API payloads and typed call outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recipient details attached to a link at issuance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Recipient {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub account_id: String,
    pub email: String,
    pub tier: String,
    pub limit: u32,
    pub issued: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub registered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedLink {
    pub link_id: String,
    pub url: String,
    pub remaining: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Unused,
    Used,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub link_id: String,
    pub url: String,
    pub status: LinkStatus,
    pub recipient: Recipient,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub redeemed_at: Option<DateTime<Utc>>,
}

/// One image to submit.
#[derive(Debug, Clone)]
pub struct UploadImage {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl UploadImage {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }

    pub fn jpeg(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes, "photo.jpg", "image/jpeg")
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered(QuotaStatus),
    AlreadyRegistered,
    UnknownTier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierSelection {
    Changed(QuotaStatus),
    UnknownTier,
    NotRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issuance {
    Issued(IssuedLink),
    /// Monthly allowance used up.
    Denied {
        limit: u32,
        reset_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    Redeemed(Vec<String>),
    Expired,
    AlreadyUsed,
    UploadFailed {
        image: u32,
        retryable: bool,
        message: String,
    },
}
