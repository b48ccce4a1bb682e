#[cfg(feature = "accelerate")]
extern crate accelerate_src;
#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

pub mod device_map;
pub mod loader;
mod loader_factory;
mod prefetch;
mod sdxl;
mod util;

pub use device_map::*;
use image::DynamicImage;
pub use loader::*;
pub use loader_factory::*;
pub use prefetch::*;
pub use sdxl::{Precision, SdxlTurboLoader, SdxlTurboModel, WeightFile, WeightManifest, WeightPaths};
use serde::{Deserialize, Serialize};
use thiserror::Error;
pub use util::*;

pub const DEFAULT_STEPS: usize = 1;
pub const DEFAULT_GUIDANCE: f64 = 0.0;
pub const DEFAULT_SIZE: usize = 512;

/// A generation request as it arrives over the wire. Everything except the
/// prompt is optional and falls back to the single-step, unguided defaults.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, PartialOrd)]
pub struct GenerationRequest {
    pub prompt: String,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub steps: Option<usize>,
    pub guidance: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("{name} must be a positive multiple of 8, got {value}")]
    Dimension { name: &'static str, value: usize },
    #[error("steps must be at least 1")]
    NoSteps,
    #[error("guidance must be a finite, non-negative number, got {0}")]
    Guidance(f64),
}

/// A request with every default filled in and every field checked.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub prompt: String,
    pub width: usize,
    pub height: usize,
    pub steps: usize,
    pub guidance: f64,
    pub seed: Option<u64>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: None,
            height: None,
            steps: None,
            guidance: None,
            seed: None,
        }
    }

    pub fn resolve(self) -> Result<GenerationSettings, RequestError> {
        let width = check_dimension("width", self.width.unwrap_or(DEFAULT_SIZE))?;
        let height = check_dimension("height", self.height.unwrap_or(DEFAULT_SIZE))?;
        let steps = self.steps.unwrap_or(DEFAULT_STEPS);
        if steps == 0 {
            return Err(RequestError::NoSteps);
        }
        let guidance = self.guidance.unwrap_or(DEFAULT_GUIDANCE);
        if !guidance.is_finite() || guidance < 0.0 {
            return Err(RequestError::Guidance(guidance));
        }
        Ok(GenerationSettings {
            prompt: self.prompt,
            width,
            height,
            steps,
            guidance,
            seed: self.seed,
        })
    }
}

fn check_dimension(name: &'static str, value: usize) -> Result<usize, RequestError> {
    if value == 0 || value % 8 != 0 {
        return Err(RequestError::Dimension { name, value });
    }
    Ok(value)
}

/// A loaded text-to-image pipeline. Implementations are shared between
/// concurrent requests and must not mutate themselves while running.
pub trait ModelLike: Send + Sync {
    fn run(&self, settings: &GenerationSettings) -> anyhow::Result<DynamicImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_resolve_to_single_unguided_step() {
        let settings = GenerationRequest::new("a lighthouse at dusk").resolve().unwrap();
        assert_eq!(settings.prompt, "a lighthouse at dusk");
        assert_eq!(settings.steps, 1);
        assert_eq!(settings.guidance, 0.0);
        assert_eq!((settings.width, settings.height), (512, 512));
        assert_eq!(settings.seed, None);
    }

    #[test]
    fn explicit_fields_are_kept() {
        let request = GenerationRequest {
            width: Some(768),
            height: Some(384),
            steps: Some(4),
            guidance: Some(2.5),
            seed: Some(42),
            ..GenerationRequest::new("x")
        };
        let settings = request.resolve().unwrap();
        assert_eq!((settings.width, settings.height), (768, 384));
        assert_eq!(settings.steps, 4);
        assert_eq!(settings.guidance, 2.5);
        assert_eq!(settings.seed, Some(42));
    }

    #[test]
    fn dimensions_must_be_multiples_of_eight() {
        let request = GenerationRequest {
            width: Some(500),
            ..GenerationRequest::new("x")
        };
        assert_eq!(
            request.resolve(),
            Err(RequestError::Dimension { name: "width", value: 500 })
        );

        let request = GenerationRequest {
            height: Some(0),
            ..GenerationRequest::new("x")
        };
        assert_eq!(
            request.resolve(),
            Err(RequestError::Dimension { name: "height", value: 0 })
        );
    }

    #[test]
    fn zero_steps_and_bad_guidance_are_rejected() {
        let request = GenerationRequest {
            steps: Some(0),
            ..GenerationRequest::new("x")
        };
        assert_eq!(request.resolve(), Err(RequestError::NoSteps));

        let request = GenerationRequest {
            guidance: Some(-1.0),
            ..GenerationRequest::new("x")
        };
        assert_eq!(request.resolve(), Err(RequestError::Guidance(-1.0)));

        let request = GenerationRequest {
            guidance: Some(f64::NAN),
            ..GenerationRequest::new("x")
        };
        assert!(matches!(request.resolve(), Err(RequestError::Guidance(_))));
    }

    #[test]
    fn empty_prompt_is_not_validated() {
        assert!(GenerationRequest::new("").resolve().is_ok());
    }

    #[test]
    fn request_deserializes_with_only_a_prompt() {
        let request: GenerationRequest = serde_json::from_str(r#"{"prompt": "owl"}"#).unwrap();
        assert_eq!(request, GenerationRequest::new("owl"));
    }
}
