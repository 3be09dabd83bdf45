//! Upload tokens and their single-use state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccountId;

/// Public identifier of an upload token. Appears in the redemption URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Allocate a new random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TokenId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Token status as stored. `Used` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Unused,
    Used,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Used => "used",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unused" => Ok(Self::Unused),
            "used" => Ok(Self::Used),
            other => Err(format!("unknown token status: {}", other)),
        }
    }
}

/// Recipient details captured at issuance. Carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecipientMeta {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub logo_link: Option<String>,
    pub bank_name: Option<String>,
}

/// Ordered pair of retrieval URLs for a redeemed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePair([String; 2]);

impl ImagePair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self([first.into(), second.into()])
    }

    pub fn first(&self) -> &str {
        &self.0[0]
    }

    pub fn second(&self) -> &str {
        &self.0[1]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0.into()
    }
}

/// Lifecycle state of a token.
///
/// Images exist only in the `Used` variant, so an unused token with images
/// (or a used one without) cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Unused,
    Used {
        images: ImagePair,
        redeemed_at: DateTime<Utc>,
    },
}

/// A single-use upload token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_id: TokenId,
    pub owner: AccountId,
    pub recipient: RecipientMeta,
    pub created_at: DateTime<Utc>,
    pub state: TokenState,
}

impl Token {
    /// New unused token with a freshly generated id.
    pub fn issue(owner: AccountId, recipient: RecipientMeta, now: DateTime<Utc>) -> Self {
        Self {
            token_id: TokenId::generate(),
            owner,
            recipient,
            created_at: now,
            state: TokenState::Unused,
        }
    }

    pub fn status(&self) -> TokenStatus {
        match self.state {
            TokenState::Unused => TokenStatus::Unused,
            TokenState::Used { .. } => TokenStatus::Used,
        }
    }

    pub fn images(&self) -> Option<&ImagePair> {
        match &self.state {
            TokenState::Unused => None,
            TokenState::Used { images, .. } => Some(images),
        }
    }

    pub fn redeemed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            TokenState::Unused => None,
            TokenState::Used { redeemed_at, .. } => Some(*redeemed_at),
        }
    }

    pub fn is_unused(&self) -> bool {
        matches!(self.state, TokenState::Unused)
    }

    /// Transition `unused -> used`, attaching `images`.
    ///
    /// Returns false and leaves the token untouched if it was already used.
    pub fn settle(&mut self, images: ImagePair, now: DateTime<Utc>) -> bool {
        if !self.is_unused() {
            return false;
        }
        self.state = TokenState::Used {
            images,
            redeemed_at: now,
        };
        true
    }
}
