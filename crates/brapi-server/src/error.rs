//! Server error types
//!
//! Every failure leaving a handler is rendered as a BrAPI envelope carrying an
//! `ERROR` status message and the matching HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::response::BrapiResponse;
use crate::storage::StoreError;

/// Result type alias for request handling
pub type BrapiResult<T> = std::result::Result<T, BrapiError>;

/// Request failures
#[derive(Error, Debug)]
pub enum BrapiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl BrapiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BrapiError::NotFound(_) => StatusCode::NOT_FOUND,
            BrapiError::BadInput(_) => StatusCode::BAD_REQUEST,
            BrapiError::Conflict(_) => StatusCode::CONFLICT,
            BrapiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BrapiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BrapiError::Forbidden(_) => StatusCode::FORBIDDEN,
            BrapiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            BrapiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            BrapiError::Store(StoreError::Duplicate { .. }) => StatusCode::CONFLICT,
            BrapiError::Store(_) | BrapiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients
    fn public_message(&self) -> String {
        match self {
            BrapiError::Store(e @ (StoreError::NotFound { .. } | StoreError::Duplicate { .. })) => {
                e.to_string()
            },
            BrapiError::Store(e) => {
                tracing::error!("Storage error: {:?}", e);
                "A storage error occurred".to_string()
            },
            BrapiError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                "Internal server error".to_string()
            },
            other => other.to_string(),
        }
    }
}

impl IntoResponse for BrapiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        BrapiResponse::error(status, self.public_message()).into_response()
    }
}
