//! REST presence handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use beacon_core::error::AppError;
use beacon_core::types::{Identity, LocationHint, PresenceStatus};
use beacon_realtime::VerifyOutcome;

use crate::dto::request::{IdentityRequest, RegisterRequest, VerifyBatchRequest};
use crate::dto::response::{ApiResponse, MessageResponse, VerifyBatchResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/presence/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<PresenceStatus>>, ApiError> {
    let identity = Identity::parse(req.identity)?;
    let location = LocationHint::from_parts(req.country, req.region);
    let status = state.engine.register(identity, location).await?;
    Ok(Json(ApiResponse::ok(status)))
}

/// GET /api/presence/{identity}
///
/// Actively verified status, not just the stored flag.
pub async fn get_status(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<ApiResponse<PresenceStatus>>, ApiError> {
    let identity = Identity::parse(identity)?;
    match state.engine.verify_one(identity.clone()).await? {
        VerifyOutcome::Found(status) => Ok(Json(ApiResponse::ok(status))),
        VerifyOutcome::NotFound => Err(AppError::not_found(format!(
            "Identity '{identity}' not found"
        ))
        .into()),
    }
}

/// POST /api/presence/verify
pub async fn verify_batch(
    State(state): State<AppState>,
    Json(req): Json<VerifyBatchRequest>,
) -> Result<Json<ApiResponse<VerifyBatchResponse>>, ApiError> {
    let identities = req
        .identities
        .into_iter()
        .map(Identity::parse)
        .collect::<Result<Vec<_>, _>>()?;
    let requester = req.requester.map(Identity::parse).transpose()?;

    let corrected = state.engine.verify_many(identities, requester).await?;
    Ok(Json(ApiResponse::ok(VerifyBatchResponse { corrected })))
}

/// POST /api/presence/ping
///
/// Connectionless liveness signal.
pub async fn ping(
    State(state): State<AppState>,
    Json(req): Json<IdentityRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MessageResponse>>), ApiError> {
    let identity = Identity::parse(req.identity)?;
    state.engine.liveness(identity, None).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(MessageResponse {
            message: "Liveness recorded".to_string(),
        })),
    ))
}

/// POST /api/presence/offline
pub async fn go_offline(
    State(state): State<AppState>,
    Json(req): Json<IdentityRequest>,
) -> Result<Json<ApiResponse<PresenceStatus>>, ApiError> {
    let identity = Identity::parse(req.identity)?;
    let status = state.engine.mark_offline(identity).await?;
    Ok(Json(ApiResponse::ok(status)))
}
