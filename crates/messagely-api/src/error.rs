use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use messagely_db::StoreError;
use messagely_types::api::{ErrorBody, ErrorResponse};

use crate::tokens::TokenError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Bad username/password pair.
    #[error("Username or password incorrect.")]
    Authentication,

    /// No identity, or the wrong one, for this route.
    #[error("Unauthorized.")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("Method not allowed.")]
    MethodNotAllowed,

    #[error("{0}")]
    DuplicateUser(String),

    #[error("{0}")]
    Integrity(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Authentication => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::DuplicateUser(_) => StatusCode::CONFLICT,
            ApiError::Integrity(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to the client.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Integrity(_) | ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUser(username) => {
                ApiError::DuplicateUser(format!("Username '{}' is already taken.", username))
            }
            StoreError::UserNotFound(username) => {
                ApiError::NotFound(format!("User '{}' cannot be found.", username))
            }
            StoreError::MessageNotFound(id) => {
                ApiError::NotFound(format!("Message {} cannot be found.", id))
            }
            StoreError::Integrity(detail) => ApiError::Integrity(detail),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(_: TokenError) -> Self {
        ApiError::Unauthorized
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {:#}", self);
        }

        let body = ErrorResponse {
            error: ErrorBody {
                message: self.user_message(),
                status: status.as_u16(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Reject a missing or empty field.
pub fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::Validation(format!("{} is required.", field))),
    }
}
