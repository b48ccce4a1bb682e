use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device};
use hf_hub::api::tokio::Api;
use tracing::debug;

use crate::{DeviceMap, ModelVariant};

const CLIP_TOKENIZER_REPO: &str = "openai/clip-vit-large-patch14";
const CLIP2_TOKENIZER_REPO: &str = "laion/CLIP-ViT-bigG-14-laion2B-39B-b160k";
// The stock SDXL VAE overflows in f16.
const FP16_VAE_REPO: &str = "madebyollin/sdxl-vae-fp16-fix";

/// Weight precision, which decides both the checkpoint files and the dtype
/// the UNet and VAE run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Half,
    Full,
}

impl Precision {
    pub fn for_device(device: &Device) -> Self {
        if device.is_cpu() {
            Precision::Full
        } else {
            Precision::Half
        }
    }

    /// The precision `select_best_device` would end up with, without opening
    /// a device: an ordinal only means half precision when an accelerator
    /// backend is compiled in.
    pub fn for_device_map(device_map: DeviceMap) -> Self {
        match device_map {
            DeviceMap::Ordinal(_) if cuda_is_available() || metal_is_available() => {
                Precision::Half
            }
            _ => Precision::Full,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Precision::Half => DType::F16,
            Precision::Full => DType::F32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightFile {
    pub repo: &'static str,
    pub file: &'static str,
}

impl WeightFile {
    const fn new(repo: &'static str, file: &'static str) -> Self {
        Self { repo, file }
    }

    async fn fetch(&self, api: &Api) -> Result<PathBuf> {
        debug!(repo = self.repo, file = self.file, "fetching");
        api.model(self.repo.to_string())
            .get(self.file)
            .await
            .with_context(|| format!("failed to get {} from {}", self.file, self.repo))
    }
}

/// Every file a variant needs, for one precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightManifest {
    pub tokenizer: WeightFile,
    pub tokenizer2: WeightFile,
    pub clip: WeightFile,
    pub clip2: WeightFile,
    pub unet: WeightFile,
    pub vae: WeightFile,
}

/// Local cache paths of a fetched [`WeightManifest`].
#[derive(Debug, Clone)]
pub struct WeightPaths {
    pub tokenizer: PathBuf,
    pub tokenizer2: PathBuf,
    pub clip: PathBuf,
    pub clip2: PathBuf,
    pub unet: PathBuf,
    pub vae: PathBuf,
}

impl WeightManifest {
    pub fn for_variant(variant: ModelVariant, precision: Precision) -> Self {
        let repo = variant.repo_id();
        let (clip, clip2, unet) = match precision {
            Precision::Half => (
                "text_encoder/model.fp16.safetensors",
                "text_encoder_2/model.fp16.safetensors",
                "unet/diffusion_pytorch_model.fp16.safetensors",
            ),
            Precision::Full => (
                "text_encoder/model.safetensors",
                "text_encoder_2/model.safetensors",
                "unet/diffusion_pytorch_model.safetensors",
            ),
        };
        let vae = match precision {
            Precision::Half => WeightFile::new(FP16_VAE_REPO, "diffusion_pytorch_model.safetensors"),
            Precision::Full => WeightFile::new(repo, "vae/diffusion_pytorch_model.safetensors"),
        };

        Self {
            tokenizer: WeightFile::new(CLIP_TOKENIZER_REPO, "tokenizer.json"),
            tokenizer2: WeightFile::new(CLIP2_TOKENIZER_REPO, "tokenizer.json"),
            clip: WeightFile::new(repo, clip),
            clip2: WeightFile::new(repo, clip2),
            unet: WeightFile::new(repo, unet),
            vae,
        }
    }

    #[cfg(test)]
    fn files(&self) -> [&WeightFile; 6] {
        [
            &self.tokenizer,
            &self.tokenizer2,
            &self.clip,
            &self.clip2,
            &self.unet,
            &self.vae,
        ]
    }

    /// Fetch every file, hitting the network only for files missing from the cache.
    pub async fn fetch(&self, api: &Api) -> Result<WeightPaths> {
        Ok(WeightPaths {
            tokenizer: self.tokenizer.fetch(api).await?,
            tokenizer2: self.tokenizer2.fetch(api).await?,
            clip: self.clip.fetch(api).await?,
            clip2: self.clip2.fetch(api).await?,
            unet: self.unet.fetch(api).await?,
            vae: self.vae.fetch(api).await?,
        })
    }
}
