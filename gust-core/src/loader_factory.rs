use anyhow::{anyhow, Result};
use hf_hub::api::tokio::Api;
use tracing::info;

use crate::{DeviceMap, Loader, ModelLike, SdxlTurboLoader};
use std::sync::Arc;

/// Enum of supported model families
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelType {
    StableDiffusionXl,
    StableDiffusion,
}

impl ModelType {
    /// Detect model type from model name
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name_upper = model_name.to_uppercase();

        if name_upper.contains("SDXL") || name_upper.contains("STABLE-DIFFUSION-XL") {
            Some(ModelType::StableDiffusionXl)
        } else if name_upper.contains("STABLE-DIFFUSION") || name_upper.contains("SD-") {
            Some(ModelType::StableDiffusion)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    SdxlTurbo,
}

impl ModelVariant {
    /// Detect model variant from model name
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name_upper = model_name.to_uppercase();

        match ModelType::from_name(model_name)? {
            ModelType::StableDiffusionXl if name_upper.contains("TURBO") => {
                Some(ModelVariant::SdxlTurbo)
            }
            _ => None,
        }
    }

    /// Hugging Face repository holding the variant's UNet and text encoders.
    pub fn repo_id(&self) -> &'static str {
        match self {
            ModelVariant::SdxlTurbo => "stabilityai/sdxl-turbo",
        }
    }
}

/// Resolve a model name into a variant this crate knows how to load.
pub fn resolve_variant(model_name: &str) -> Result<ModelVariant> {
    let model_type = ModelType::from_name(model_name)
        .ok_or_else(|| anyhow!("Unsupported model type: {}", model_name))?;
    ModelVariant::from_name(model_name).ok_or_else(|| {
        anyhow!(
            "Model type {:?} is recognized but variant {} is not yet implemented",
            model_type,
            model_name
        )
    })
}

/// Load a model based on its name, automatically detecting the appropriate loader
pub async fn load_model(
    model_name: &str,
    api: Api,
    device_map: DeviceMap,
) -> Result<Arc<dyn ModelLike>> {
    let variant = resolve_variant(model_name)?;

    info!(model = model_name, ?variant, "loading model");

    match variant {
        ModelVariant::SdxlTurbo => {
            let model = SdxlTurboLoader::load(variant, api, device_map).await?;
            Ok(Arc::new(model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdxl_turbo_is_detected_case_insensitively() {
        assert_eq!(
            ModelVariant::from_name("stabilityai/sdxl-turbo"),
            Some(ModelVariant::SdxlTurbo)
        );
        assert_eq!(
            ModelVariant::from_name("StabilityAI/SDXL-Turbo"),
            Some(ModelVariant::SdxlTurbo)
        );
        assert_eq!(ModelVariant::SdxlTurbo.repo_id(), "stabilityai/sdxl-turbo");
    }

    #[test]
    fn known_family_without_loader_is_an_error() {
        assert_eq!(
            ModelType::from_name("stabilityai/stable-diffusion-xl-base-1.0"),
            Some(ModelType::StableDiffusionXl)
        );
        let err = resolve_variant("stabilityai/stable-diffusion-xl-base-1.0").unwrap_err();
        assert!(err.to_string().contains("not yet implemented"));

        assert_eq!(
            ModelType::from_name("stabilityai/sd-turbo"),
            Some(ModelType::StableDiffusion)
        );
        assert!(resolve_variant("stabilityai/sd-turbo").is_err());
    }

    #[test]
    fn unknown_model_is_unsupported() {
        assert_eq!(ModelType::from_name("black-forest-labs/FLUX.1-schnell"), None);
        let err = resolve_variant("black-forest-labs/FLUX.1-schnell").unwrap_err();
        assert!(err.to_string().starts_with("Unsupported model type"));
    }
}
