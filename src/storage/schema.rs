//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Accounts table schema.
#[derive(Iden)]
pub enum Accounts {
    Table,
    #[iden = "account_id"]
    AccountId,
    #[iden = "email"]
    Email,
    #[iden = "tier"]
    Tier,
    #[iden = "issued_this_period"]
    IssuedThisPeriod,
    #[iden = "period_reset_at"]
    PeriodResetAt,
    #[iden = "created_at"]
    CreatedAt,
}

/// Tokens table schema.
#[derive(Iden)]
pub enum Tokens {
    Table,
    #[iden = "token_id"]
    TokenId,
    #[iden = "owner_account_id"]
    OwnerAccountId,
    #[iden = "status"]
    Status,
    #[iden = "recipient"]
    Recipient,
    #[iden = "images"]
    Images,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "redeemed_at"]
    RedeemedAt,
}

/// Orphaned charges table schema.
#[derive(Iden)]
pub enum OrphanedCharges {
    Table,
    #[iden = "charge_id"]
    ChargeId,
    #[iden = "account_id"]
    AccountId,
    #[iden = "period_reset_at"]
    PeriodResetAt,
    #[iden = "recorded_at"]
    RecordedAt,
    #[iden = "reason"]
    Reason,
    #[iden = "resolved_at"]
    ResolvedAt,
}

/// SQL for creating the accounts table.
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    tier TEXT NOT NULL,
    issued_this_period INTEGER NOT NULL DEFAULT 0 CHECK (issued_this_period >= 0),
    period_reset_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// SQL for creating the tokens table.
///
/// `images` is NULL exactly when `status` is `unused`.
pub const CREATE_TOKENS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tokens (
    token_id TEXT PRIMARY KEY,
    owner_account_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('unused', 'used')),
    recipient TEXT NOT NULL,
    images TEXT,
    created_at TEXT NOT NULL,
    redeemed_at TEXT,
    CHECK ((status = 'used') = (images IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_tokens_owner ON tokens(owner_account_id, created_at);
"#;

/// SQL for creating the orphaned charges table.
pub const CREATE_ORPHANED_CHARGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orphaned_charges (
    charge_id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    period_reset_at TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    reason TEXT NOT NULL,
    resolved_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_orphaned_charges_pending ON orphaned_charges(resolved_at, recorded_at);
"#;
