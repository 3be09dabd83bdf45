//! Route handlers.

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::dto::{
    HealthResponse, IssuedLinkResponse, LinkResponse, LinksResponse, QuotaResponse,
    RedeemResponse, RegisterRequest, TierRequest,
};
use super::{ApiError, AppState, Authenticated};
use crate::model::{RecipientMeta, TokenId};
use crate::services::{ImageUpload, IssueOutcome, RedeemOutcome, RegisterOutcome, TierChange};

type SharedState = State<Arc<AppState>>;

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ============================================================================
// Accounts
// ============================================================================

pub(super) async fn register(
    State(state): SharedState,
    Authenticated(caller): Authenticated,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<QuotaResponse>), ApiError> {
    let request = optional_json::<RegisterRequest>(&headers, &body)?;
    match state
        .accounts
        .register(&caller, request.tier.as_deref())
        .await?
    {
        RegisterOutcome::Registered(status) => Ok((StatusCode::CREATED, Json(status.into()))),
        RegisterOutcome::AlreadyRegistered => Err(ApiError::AlreadyRegistered),
        RegisterOutcome::UnknownTier(tier) => Err(ApiError::UnknownTier(tier)),
    }
}

pub(super) async fn quota(
    State(state): SharedState,
    Authenticated(caller): Authenticated,
) -> Result<Json<QuotaResponse>, ApiError> {
    let status = state.accounts.quota_status(&caller).await?;
    Ok(Json(status.into()))
}

pub(super) async fn select_tier(
    State(state): SharedState,
    Authenticated(caller): Authenticated,
    body: Result<Json<TierRequest>, JsonRejection>,
) -> Result<Json<QuotaResponse>, ApiError> {
    let Json(request) = body.map_err(json_error)?;
    match state
        .accounts
        .select_tier(&caller.account_id, &request.tier)
        .await?
    {
        TierChange::Changed(status) => Ok(Json(status.into())),
        TierChange::UnknownTier(tier) => Err(ApiError::UnknownTier(tier)),
        TierChange::NotRegistered => Err(ApiError::NotRegistered),
    }
}

// ============================================================================
// Links
// ============================================================================

pub(super) async fn issue_link(
    State(state): SharedState,
    Authenticated(caller): Authenticated,
    body: Result<Json<RecipientMeta>, JsonRejection>,
) -> Result<(StatusCode, Json<IssuedLinkResponse>), ApiError> {
    let Json(recipient) = body.map_err(json_error)?;
    match state.issuance.issue_link(&caller, recipient).await? {
        IssueOutcome::Issued(link) => Ok((
            StatusCode::CREATED,
            Json(IssuedLinkResponse::new(&link, &state.public_base_url)),
        )),
        IssueOutcome::Denied(denied) => Err(ApiError::Denied(denied)),
    }
}

pub(super) async fn list_links(
    State(state): SharedState,
    Authenticated(caller): Authenticated,
) -> Result<Json<LinksResponse>, ApiError> {
    let tokens = state.accounts.list_tokens(&caller.account_id).await?;
    Ok(Json(LinksResponse {
        links: tokens
            .into_iter()
            .map(|token| LinkResponse::new(token, &state.public_base_url))
            .collect(),
    }))
}

pub(super) async fn get_link(
    State(state): SharedState,
    Path(id): Path<String>,
) -> Result<Json<LinkResponse>, ApiError> {
    let token_id = parse_token_id(&id)?;
    let token = state
        .redemption
        .lookup(&token_id)
        .await?
        .ok_or(ApiError::LinkExpired)?;
    Ok(Json(LinkResponse::new(token, &state.public_base_url)))
}

pub(super) async fn redeem_link(
    State(state): SharedState,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let token_id = parse_token_id(&id)?;
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let images = read_images(multipart).await?;

    match state.redemption.redeem(token_id, images).await? {
        RedeemOutcome::Redeemed(pair) => Ok(Json(RedeemResponse {
            images: pair.into_vec(),
        })),
        RedeemOutcome::Expired => Err(ApiError::LinkExpired),
        RedeemOutcome::AlreadyUsed => Err(ApiError::AlreadyUsed),
        RedeemOutcome::UploadFailed(failure) => Err(ApiError::UploadFailed(failure)),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_token_id(raw: &str) -> Result<TokenId, ApiError> {
    raw.parse().map_err(|_| {
        debug!(id = raw, "Malformed link id");
        ApiError::LinkExpired
    })
}

/// Collect the `image1` and `image2` parts. Other parts are ignored.
async fn read_images(mut multipart: Multipart) -> Result<[ImageUpload; 2], ApiError> {
    let mut first = None;
    let mut second = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let slot = match field.name() {
            Some("image1") => &mut first,
            Some("image2") => &mut second,
            _ => continue,
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        *slot = Some(ImageUpload {
            bytes,
            content_type,
        });
    }

    match (first, second) {
        (Some(first), Some(second)) => Ok([first, second]),
        (None, _) => Err(ApiError::BadRequest("missing image1".to_string())),
        (_, None) => Err(ApiError::BadRequest("missing image2".to_string())),
    }
}

/// Decode a JSON body that may be omitted entirely. A body that is present
/// must be JSON and must decode.
fn optional_json<T: DeserializeOwned + Default>(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, ApiError> {
    if body.is_empty() {
        return Ok(T::default());
    }
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(ApiError::BadRequest(
            "Expected request with `Content-Type: application/json`".to_string(),
        ));
    }
    let Json(value) = Json::<T>::from_bytes(body).map_err(json_error)?;
    Ok(value)
}

fn json_error(err: JsonRejection) -> ApiError {
    ApiError::BadRequest(err.body_text())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
