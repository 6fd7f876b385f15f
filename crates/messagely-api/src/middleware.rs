use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use messagely_types::api::Claims;
use messagely_types::models::MessageDetail;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Extract and validate the bearer token from the Authorization header.
/// On success the verified `Claims` are attached to the request; the
/// username is trusted as signed and not looked up again.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.tokens.verify(token).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// The caller must be the user named in the path. A mismatch is reported as
/// 401, not 403.
pub fn ensure_correct_user(claims: &Claims, username: &str) -> ApiResult<()> {
    if claims.username == username {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// The caller must be the sender or the recipient.
pub fn ensure_participant(claims: &Claims, message: &MessageDetail) -> ApiResult<()> {
    if message.is_participant(&claims.username) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// The caller must be the recipient.
pub fn ensure_recipient(claims: &Claims, message: &MessageDetail) -> ApiResult<()> {
    if message.to_user.username == claims.username {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
