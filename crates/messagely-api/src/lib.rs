pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod store;
pub mod tokens;
pub mod users;

use axum::{
    Json, Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use auth::{AppState, AppStateInner};
pub use error::{ApiError, ApiResult};

/// All routes. `/auth/*` and `/health` are public; everything else runs
/// behind `require_auth`. Unknown paths and methods answer with the usual
/// JSON error body.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/{username}", get(users::get_user))
        .route("/users/{username}/to", get(users::messages_to))
        .route("/users/{username}/from", get(users::messages_from))
        .route("/messages", post(messages::send_message))
        .route("/messages/{id}", get(messages::get_message))
        .route("/messages/{id}/read", post(messages::mark_read))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found.".to_string())
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
