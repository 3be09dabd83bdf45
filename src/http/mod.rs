//! HTTP API.
//!
//! Endpoints:
//! - `GET  /api/health`
//! - `POST /api/accounts` (auth): register, optional `{"tier": ...}`
//! - `GET  /api/accounts/me` (auth): quota status
//! - `PUT  /api/accounts/me/tier` (auth): `{"tier": ...}`
//! - `POST /api/links` (auth): recipient details, issues a link
//! - `GET  /api/links` (auth): the caller's links, newest first
//! - `GET  /api/links/{id}`: public view of one link
//! - `POST /api/links/{id}/redeem`: multipart `image1` + `image2`
//! - `GET  /media/...`: filesystem blobs, when served locally

mod auth;
pub mod dto;
mod error;
mod handlers;

pub use auth::Authenticated;
pub use error::ApiError;

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, Span};

use crate::blob_store::{BlobStore, BlobStoreType, OrphanQueue};
use crate::clock::Clock;
use crate::config::Config;
use crate::identity::IdentityProvider;
use crate::ledger::QuotaLedger;
use crate::services::{AccountService, IssuanceService, RedemptionService, Timeouts};
use crate::storage::Storage;

/// Collaborators the API is built from.
pub struct Components {
    pub storage: Storage,
    pub blobs: Arc<dyn BlobStore>,
    pub orphans: OrphanQueue,
    pub identity: Arc<dyn IdentityProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Shared state for axum handlers.
pub struct AppState {
    pub ledger: Arc<QuotaLedger>,
    pub accounts: AccountService,
    pub issuance: IssuanceService,
    pub redemption: RedemptionService,
    pub identity: Arc<dyn IdentityProvider>,
    pub timeouts: Timeouts,
    /// Base for redemption URLs handed back at issuance.
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    /// Directory served at `/media`.
    pub media_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(config: &Config, components: Components) -> Self {
        let Components {
            storage,
            blobs,
            orphans,
            identity,
            clock,
        } = components;
        let timeouts = Timeouts::from(&config.timeouts);

        let ledger = Arc::new(QuotaLedger::new(
            Arc::clone(&storage.accounts),
            Arc::new(config.tiers.clone()),
            Arc::clone(&clock),
            timeouts,
        ));
        let accounts =
            AccountService::new(Arc::clone(&ledger), Arc::clone(&storage.tokens), timeouts);
        let issuance = IssuanceService::new(Arc::clone(&ledger), &storage, timeouts);
        let redemption =
            RedemptionService::new(Arc::clone(&storage.tokens), blobs, orphans, clock, timeouts)
                .with_retry(config.retry.clone());

        let filesystem = &config.blob_store.filesystem;
        let media_dir = (config.blob_store.store_type == BlobStoreType::Filesystem
            && filesystem.served_locally())
        .then(|| filesystem.base_path.clone());

        Self {
            ledger,
            accounts,
            issuance,
            redemption,
            identity,
            timeouts,
            public_base_url: config.server.public_base_url.trim_end_matches('/').to_string(),
            max_upload_bytes: config.server.max_upload_bytes,
            media_dir,
        }
    }
}

/// Start the API server on `addr`.
///
/// Runs until Ctrl+C.
pub async fn serve(
    state: Arc<AppState>,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(state, listener).await
}

/// Serve on an already bound listener.
///
/// When bound to port 0 the OS assigns an ephemeral port. The actual bound
/// address is always logged so it can be discovered.
pub async fn serve_listener(
    state: Arc<AppState>,
    listener: tokio::net::TcpListener,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(addr = %listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
        })
        .await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/accounts", post(handlers::register))
        .route("/api/accounts/me", get(handlers::quota))
        .route("/api/accounts/me/tier", put(handlers::select_tier))
        .route(
            "/api/links",
            post(handlers::issue_link).get(handlers::list_links),
        )
        .route("/api/links/:id", get(handlers::get_link))
        .route("/api/links/:id/redeem", post(handlers::redeem_link));

    let app = match &state.media_dir {
        Some(dir) => api.nest_service("/media", ServeDir::new(dir)),
        None => api,
    };

    app.layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    tracing::info_span!(
        "http",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}
