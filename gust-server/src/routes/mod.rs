use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod health;
pub mod images;

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", get(images::generate_jpeg))
        .route("/health", get(health::health))
        .route("/v1/images/generations", post(images::generate_base64_png))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
