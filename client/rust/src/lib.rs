//! Rust client for the photolink upload link API.
//!
//! Result variants the API reports as status codes (quota denied, link
//! expired, link already used, upload failed) come back as typed outcomes.
//! Only transport faults and unexpected statuses are errors.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use photolink_client::{Issuance, PhotolinkClient, Recipient, UploadImage};
//!
//! async fn example() -> photolink_client::Result<()> {
//!     let owner = PhotolinkClient::new("http://localhost:8080")?.with_credential("token");
//!     if let Issuance::Issued(link) = owner.issue_link(&Recipient::default()).await? {
//!         let recipient = PhotolinkClient::new("http://localhost:8080")?;
//!         recipient
//!             .redeem(&link.link_id, UploadImage::jpeg(front), UploadImage::jpeg(back))
//!             .await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::PhotolinkClient;
pub use error::{ApiFailure, ClientError, Result};
pub use types::{
    Issuance, IssuedLink, Link, LinkStatus, QuotaStatus, Recipient, Redemption, Registration,
    TierSelection, UploadImage,
};
