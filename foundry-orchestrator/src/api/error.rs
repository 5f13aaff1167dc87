//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::service::JobError;
use crate::store::StoreError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    PreconditionFailed(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::PreconditionFailed(msg) => (StatusCode::PRECONDITION_FAILED, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match &err {
            JobError::InvalidJobId(_)
            | JobError::Protocol(_)
            | JobError::InvalidSlug(_)
            | JobError::DuplicateSlug(_)
            | JobError::InvalidAuthToken(_)
            | JobError::Codec(_)
            | JobError::Parameters(_) => ApiError::BadRequest(err.to_string()),
            JobError::NotOwner => ApiError::Forbidden(err.to_string()),
            JobError::NotStarted | JobError::AlreadyCompleted => {
                ApiError::PreconditionFailed(err.to_string())
            }
            JobError::Store(StoreError::NotFound { .. }) => ApiError::NotFound(err.to_string()),
            JobError::Invalidated(_) | JobError::Store(_) | JobError::Pubsub(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
