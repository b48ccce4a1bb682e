//! Handler error type.
//!
//! Generation failures are deliberately opaque to callers: the full error
//! chain is logged and the client sees a bare 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gust_core::RequestError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// One of the optional tuning fields is out of range.
    #[error("bad request: {0}")]
    BadRequest(#[from] RequestError),

    /// The pipeline or the image encoder failed.
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),

    /// The blocking generation task panicked or was cancelled.
    #[error("generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::BadRequest(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
            ServerError::Generation(e) => {
                error!(error = ?e, "error generating image");
                internal_error()
            }
            ServerError::Task(e) => {
                error!(error = %e, "generation task failed");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
