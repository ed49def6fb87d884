use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Upstream rejected our credentials (401/403). Fatal for a live run —
    /// surfaced to the operator, never retried.
    #[error("upstream auth rejected: {0}")]
    Auth(String),

    /// Network failure or upstream 5xx. The ingest orchestrator retries a
    /// bounded number of times, then aborts without writing a snapshot.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Auth(_) | AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
