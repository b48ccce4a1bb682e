//! Image generation endpoints.

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::header,
    response::IntoResponse,
};
use base64::{prelude::BASE64_STANDARD, Engine};
use gust_core::{encode_image, GenerationRequest};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::ServerError, state::AppState};

/// `GET /generate?prompt=...`: the image itself, as JPEG.
pub async fn generate_jpeg(
    State(state): State<Arc<AppState>>,
    Query(req): Query<GenerationRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let image = state.generate(req).await?;
    let bytes = encode_image(&image, ImageFormat::Jpeg).map_err(ServerError::Generation)?;
    info!(bytes = bytes.len(), "generated image");
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GenerationResponse {
    pub image: String,
}

/// `POST /v1/images/generations`: a base64-encoded PNG wrapped in JSON.
pub async fn generate_base64_png(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerationRequest>,
) -> Result<Json<GenerationResponse>, ServerError> {
    let image = state.generate(req).await?;
    let bytes = encode_image(&image, ImageFormat::Png).map_err(ServerError::Generation)?;
    Ok(Json(GenerationResponse {
        image: BASE64_STANDARD.encode(&bytes),
    }))
}
