use std::sync::Arc;

use gust_core::{GenerationRequest, ModelLike};
use image::DynamicImage;

use crate::error::ServerError;

/// Application state holding the model loaded at startup.
#[derive(Clone)]
pub struct AppState(Arc<dyn ModelLike>);

impl AppState {
    pub fn new(model: Arc<dyn ModelLike>) -> Self {
        Self(model)
    }

    /// Resolve the request and run the pipeline on the blocking pool.
    pub async fn generate(&self, request: GenerationRequest) -> Result<DynamicImage, ServerError> {
        let settings = request.resolve()?;
        let model = Arc::clone(&self.0);
        tokio::task::spawn_blocking(move || model.run(&settings))
            .await?
            .map_err(ServerError::Generation)
    }
}
