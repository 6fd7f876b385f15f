use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use tracing::{info, warn};

use messagely_db::Database;
use messagely_types::api::{LoginRequest, RegisterRequest, TokenResponse};
use messagely_types::models::NewUser;

use crate::credentials::Credentials;
use crate::error::{ApiError, ApiResult, required};
use crate::store::{MessageStore, UserStore};
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub users: UserStore,
    pub messages: MessageStore,
    pub tokens: TokenService,
}

impl AppStateInner {
    pub fn new(db: Database, credentials: Credentials, tokens: TokenService) -> AppState {
        let db = Arc::new(db);
        Arc::new(Self {
            users: UserStore::new(db.clone(), credentials),
            messages: MessageStore::new(db),
            tokens,
        })
    }
}

/// `POST /auth/register`: create the user, record a login, return a token.
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let new_user = NewUser {
        username: required(req.username, "username")?,
        password: required(req.password, "password")?,
        first_name: required(req.first_name, "first_name")?,
        last_name: required(req.last_name, "last_name")?,
        phone: required(req.phone, "phone")?,
    };

    let user = state.users.register(new_user).await?;

    // Separate write: a failure here leaves last_login_at null.
    state.users.touch_login(&user.username).await?;

    let token = state.tokens.issue(&user.username).map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// `POST /auth/login`: bad credentials are a 400, not a 401.
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let username = required(req.username, "username")?;
    let password = required(req.password, "password")?;

    if !state.users.authenticate(&username, &password).await? {
        warn!("Failed login for {}", username);
        return Err(ApiError::Authentication);
    }

    state.users.touch_login(&username).await?;
    let token = state.tokens.issue(&username).map_err(anyhow::Error::from)?;

    info!("{} logged in", username);
    Ok(Json(TokenResponse { token }))
}
