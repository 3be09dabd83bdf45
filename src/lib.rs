//! photolink - quota-metered, single-use photo upload links.
//!
//! An account issues upload links against a monthly allowance set by its
//! subscription tier. Each link can be redeemed exactly once by an
//! unauthenticated recipient submitting two images.

pub mod blob_store;
pub mod clock;
pub mod config;
pub mod http;
pub mod identity;
pub mod ledger;
pub mod model;
pub mod services;
pub mod storage;
pub mod tier;
pub mod utils;
