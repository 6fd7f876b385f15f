use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;

use messagely_types::api::{Claims, SendMessageRequest};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, required};
use crate::middleware::{ensure_participant, ensure_recipient};

/// `GET /messages/{id}`: only the sender or recipient may see it. A missing
/// message is a 404 before any participant check.
pub async fn get_message(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message = state.messages.get(id).await?;
    ensure_participant(&claims, &message)?;
    Ok(Json(message))
}

/// `POST /messages`: the sender is always the caller.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let to_username = required(req.to_username, "to_username")?;
    let body = required(req.body, "body")?;

    let message = state
        .messages
        .create(&claims.username, &to_username, &body)
        .await?;

    info!(
        "Message {} sent from {} to {}",
        message.id, message.from_username, message.to_username
    );
    Ok((StatusCode::CREATED, Json(message)))
}

/// `POST /messages/{id}/read`: recipient only. Repeat calls return the
/// original receipt.
pub async fn mark_read(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message = state.messages.get(id).await?;
    ensure_recipient(&claims, &message)?;
    Ok(Json(state.messages.mark_read(id).await?))
}
