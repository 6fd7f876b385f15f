use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;

use messagely_types::api::Claims;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::ensure_correct_user;

/// `GET /users`: every user, ordered by username.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.users.list().await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    WithRejection(Path(username), _): WithRejection<Path<String>, ApiError>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    ensure_correct_user(&claims, &username)?;
    Ok(Json(state.users.get(&username).await?))
}

/// `GET /users/{username}/to`: inbox, sender expanded.
pub async fn messages_to(
    State(state): State<AppState>,
    WithRejection(Path(username), _): WithRejection<Path<String>, ApiError>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    ensure_correct_user(&claims, &username)?;
    Ok(Json(state.users.messages_to(&username).await?))
}

/// `GET /users/{username}/from`: outbox, recipient expanded.
pub async fn messages_from(
    State(state): State<AppState>,
    WithRejection(Path(username), _): WithRejection<Path<String>, ApiError>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    ensure_correct_user(&claims, &username)?;
    Ok(Json(state.users.messages_from(&username).await?))
}
