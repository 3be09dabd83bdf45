//! Domain records: accounts and upload tokens.

mod account;
mod token;

pub use account::{next_period_boundary, Account, AccountId};
pub use token::{ImagePair, RecipientMeta, Token, TokenId, TokenState, TokenStatus};
