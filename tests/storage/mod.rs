//! Storage contract test suites.
//!
//! Every backend runs the same suites so they agree on quota, token, and
//! reconciliation semantics. Each suite is a set of generic async fns plus a
//! `run_*_tests!` macro that calls them in order against one store. Tests
//! use fresh account ids, so a single store instance serves a whole suite.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use photolink::ledger::AccountSeed;
use photolink::model::RecipientMeta;

pub mod account_store_tests;
pub mod issuance_tests;
pub mod token_store_tests;

/// Noon UTC on the given day. Whole seconds survive every backend's
/// timestamp encoding.
pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// First instant of a month, where quota periods roll.
pub fn month_start(y: i32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0).unwrap()
}

/// Seed for an account id no other test uses.
pub fn fresh_seed() -> AccountSeed {
    let id = format!("acct-{}", Uuid::new_v4());
    AccountSeed::new(id.as_str(), format!("{}@example.com", id))
}

pub fn recipient(name: &str) -> RecipientMeta {
    RecipientMeta {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        phone: "555-0100".to_string(),
        logo_link: None,
        bank_name: Some("First Savings".to_string()),
    }
}
