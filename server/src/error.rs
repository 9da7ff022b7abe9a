use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every failure a handler can report, one variant per kind so callers and
/// clients can tell them apart.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    VotingClosed(String),

    #[error("{0}")]
    AlreadyVoted(String),

    #[error("{0}")]
    DuplicateVote(String),

    #[error("{0}")]
    InvalidCandidate(String),

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Storage(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. }
            | AppError::VotingClosed { .. }
            | AppError::InvalidCandidate { .. }
            | AppError::Config { .. } => StatusCode::BAD_REQUEST,
            AppError::Auth { .. } => StatusCode::UNAUTHORIZED,
            AppError::Permission { .. } | AppError::AlreadyVoted { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::DuplicateVote { .. } => StatusCode::CONFLICT,
            AppError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Storage details stay in the logs, not on the wire.
        let message = match &self {
            AppError::Storage(detail) => {
                error!("storage error: {detail}");
                "Server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
