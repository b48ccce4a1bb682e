use anyhow::{Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::Module;
use candle_transformers::models::stable_diffusion::{
    self, clip, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use hf_hub::api::tokio::Api;
use image::DynamicImage;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

mod weights;

pub use weights::{Precision, WeightFile, WeightManifest, WeightPaths};

use crate::{
    select_best_device, tensor_to_image, DeviceMap, GenerationSettings, Loader, ModelLike,
    ModelVariant,
};

const LATENT_CHANNELS: usize = 4;
const VAE_SCALE: f64 = 0.13025;
const END_OF_TEXT: &str = "<|endoftext|>";

pub struct SdxlTurboModel {
    device: Device,
    dtype: DType,
    tokenizer: Tokenizer,
    tokenizer2: Tokenizer,
    clip: ClipTextTransformer,
    clip2: ClipTextTransformer,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
}

impl SdxlTurboModel {
    /// Embeds the prompt with both text encoders and joins them on the
    /// feature axis. With guidance the unconditional embedding is stacked
    /// first along the batch axis.
    fn encode_prompt(
        &self,
        config: &StableDiffusionConfig,
        prompt: &str,
        use_guidance: bool,
    ) -> Result<Tensor> {
        let clip2_config = config
            .clip2
            .as_ref()
            .context("SDXL config has no second text encoder")?;
        let first = encode_text(
            &self.tokenizer,
            &self.clip,
            &config.clip,
            prompt,
            use_guidance,
            &self.device,
        )?;
        let second = encode_text(
            &self.tokenizer2,
            &self.clip2,
            clip2_config,
            prompt,
            use_guidance,
            &self.device,
        )?;
        Ok(Tensor::cat(&[first, second], D::Minus1)?.to_dtype(self.dtype)?)
    }
}

impl ModelLike for SdxlTurboModel {
    fn run(&self, settings: &GenerationSettings) -> Result<DynamicImage> {
        let config =
            StableDiffusionConfig::sdxl_turbo(None, Some(settings.height), Some(settings.width));

        match settings.seed {
            // candle cannot reseed its CPU generator.
            Some(seed) if self.device.is_cpu() => warn!(seed, "seed ignored on CPU"),
            Some(seed) => self.device.set_seed(seed)?,
            None => {}
        }

        let use_guidance = settings.guidance > 1.0;
        let text_embeddings = self.encode_prompt(&config, &settings.prompt, use_guidance)?;

        let mut scheduler = config.build_scheduler(settings.steps)?;
        let timesteps = scheduler.timesteps().to_vec();

        let latents = Tensor::randn(
            0f32,
            1f32,
            (1, LATENT_CHANNELS, config.height / 8, config.width / 8),
            &self.device,
        )?;
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        for (index, &timestep) in timesteps.iter().enumerate() {
            let input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let input = scheduler.scale_model_input(input, timestep)?;
            let noise_pred = self.unet.forward(&input, timestep as f64, &text_embeddings)?;
            let noise_pred = if use_guidance {
                let chunks = noise_pred.chunk(2, 0)?;
                let (uncond, text) = (&chunks[0], &chunks[1]);
                (uncond + ((text - uncond)? * settings.guidance)?)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            debug!(step = index + 1, of = timesteps.len(), timestep, "denoised");
        }

        let decoded = self.vae.decode(&(&latents / VAE_SCALE)?)?;
        debug!("decoded latents");

        // [-1, 1] -> [0, 255]
        let img = ((decoded / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let img = (img.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?.i(0)?;

        tensor_to_image(&img)
    }
}

fn encode_text(
    tokenizer: &Tokenizer,
    encoder: &ClipTextTransformer,
    clip_config: &clip::Config,
    prompt: &str,
    use_guidance: bool,
    device: &Device,
) -> Result<Tensor> {
    let pad_token = clip_config.pad_with.as_deref().unwrap_or(END_OF_TEXT);
    let vocab = tokenizer.get_vocab(true);
    let token_id = |token: &str| -> Result<u32> {
        vocab
            .get(token)
            .copied()
            .with_context(|| format!("tokenizer has no {token:?} token"))
    };
    let pad_id = token_id(pad_token)?;
    let eos_id = token_id(END_OF_TEXT)?;

    let embed = |text: &str| -> Result<Tensor> {
        let ids = tokenizer
            .encode(text, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        let ids = pad_tokens(ids, eos_id, pad_id, clip_config.max_position_embeddings);
        let ids = Tensor::new(ids.as_slice(), device)?.unsqueeze(0)?;
        Ok(encoder.forward(&ids)?)
    };

    let conditional = embed(prompt)?;
    if use_guidance {
        let unconditional = embed("")?;
        Ok(Tensor::cat(&[unconditional, conditional], 0)?)
    } else {
        Ok(conditional)
    }
}

/// Fits token ids to the encoder context. Longer prompts are cut but keep
/// their closing end-of-text token; shorter ones are padded.
fn pad_tokens(mut ids: Vec<u32>, eos_id: u32, pad_id: u32, len: usize) -> Vec<u32> {
    if ids.len() > len {
        debug!(tokens = ids.len(), limit = len, "truncating prompt");
        ids.truncate(len - 1);
        ids.push(eos_id);
    }
    ids.resize(len, pad_id);
    ids
}

pub struct SdxlTurboLoader;

impl Loader for SdxlTurboLoader {
    type Model = SdxlTurboModel;

    async fn load(variant: ModelVariant, api: Api, device_map: DeviceMap) -> Result<Self::Model> {
        let device = select_best_device(device_map).context("failed to set up device")?;
        let precision = Precision::for_device(&device);
        let dtype = precision.dtype();

        let paths = WeightManifest::for_variant(variant, precision)
            .fetch(&api)
            .await?;
        let config = StableDiffusionConfig::sdxl_turbo(None, None, None);
        let clip2_config = config
            .clip2
            .as_ref()
            .context("SDXL config has no second text encoder")?;

        // --- Tokenizers ---
        let tokenizer = Tokenizer::from_file(&paths.tokenizer)
            .map_err(Error::msg)
            .context("failed to load CLIP tokenizer")?;
        let tokenizer2 = Tokenizer::from_file(&paths.tokenizer2)
            .map_err(Error::msg)
            .context("failed to load CLIP-G tokenizer")?;

        // --- Text encoders (always f32) ---
        let clip =
            stable_diffusion::build_clip_transformer(&config.clip, &paths.clip, &device, DType::F32)
                .context("failed to load CLIP text encoder")?;
        let clip2 =
            stable_diffusion::build_clip_transformer(clip2_config, &paths.clip2, &device, DType::F32)
                .context("failed to load CLIP-G text encoder")?;

        // --- UNet and VAE ---
        let unet = config
            .build_unet(
                &paths.unet,
                &device,
                LATENT_CHANNELS,
                cfg!(feature = "flash-attn"),
                dtype,
            )
            .context("failed to load UNet")?;
        let vae = config
            .build_vae(&paths.vae, &device, dtype)
            .context("failed to load VAE")?;

        info!(?variant, ?dtype, "model ready");

        Ok(SdxlTurboModel {
            device,
            dtype,
            tokenizer,
            tokenizer2,
            clip,
            clip2,
            unet,
            vae,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompts_are_padded_to_context() {
        let ids = pad_tokens(vec![49406, 320, 49407], 49407, 0, 8);
        assert_eq!(ids, vec![49406, 320, 49407, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn long_prompts_are_truncated_to_context() {
        let mut prompt = vec![49406];
        prompt.extend(std::iter::repeat(320).take(98));
        prompt.push(49407);

        let ids = pad_tokens(prompt, 49407, 0, 77);
        assert_eq!(ids.len(), 77);
        assert_eq!(ids[0], 49406);
        assert!(ids[1..76].iter().all(|&id| id == 320));
        assert_eq!(ids[76], 49407);
    }

    #[test]
    fn prompt_filling_the_context_exactly_is_untouched() {
        let prompt: Vec<u32> = (0..77).collect();
        assert_eq!(pad_tokens(prompt.clone(), 49407, 0, 77), prompt);
    }

    #[test]
    fn turbo_config_carries_both_text_encoders() {
        let config = StableDiffusionConfig::sdxl_turbo(None, Some(256), Some(384));
        assert!(config.clip2.is_some());
        assert_eq!((config.height, config.width), (256, 384));
        assert_eq!(config.clip.max_position_embeddings, 77);
    }
}
