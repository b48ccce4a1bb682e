use std::io::Cursor;

use anyhow::{Context, Result};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Tensor};
use image::{ColorType, DynamicImage, ImageFormat};
use tracing::{info, warn};

use crate::DeviceMap;

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    let device = match device_map {
        DeviceMap::ForceCpu => Device::Cpu,
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Device::new_cuda(ordinal)?,
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Device::new_metal(ordinal)?,
        DeviceMap::Ordinal(_) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            warn!("running on CPU, to run on GPU (metal) build with `--features metal`");
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            warn!("running on CPU, to run on GPU build with `--features cuda`");
            Device::Cpu
        }
    };
    info!(device = ?device.location(), "selected device");
    Ok(device)
}

/// Converts a u8 tensor with shape (3, height, width) into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_image expects an image with 3 channels, got {channels}");
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .context("error converting tensor to image buffer")?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

/// Serializes an image into an in-memory buffer of the given format.
///
/// JPEG has no alpha channel, so anything that is not already RGB8 is
/// flattened to RGB8 first.
pub fn encode_image(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    let written = if format == ImageFormat::Jpeg && img.color() != ColorType::Rgb8 {
        DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut cursor, format)
    } else {
        img.write_to(&mut cursor, format)
    };
    written.with_context(|| format!("failed to encode image as {format:?}"))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use image::{Rgba, RgbaImage};

    #[test]
    fn tensor_becomes_rgb_image_with_matching_size() {
        let tensor = Tensor::zeros((3, 4, 6), DType::U8, &Device::Cpu).unwrap();
        let img = tensor_to_image(&tensor).unwrap();
        assert_eq!((img.width(), img.height()), (6, 4));
        assert_eq!(img.color(), ColorType::Rgb8);
    }

    #[test]
    fn tensor_channel_order_is_preserved() {
        // One pixel: r=10, g=20, b=30.
        let tensor = Tensor::new(&[[[10u8]], [[20u8]], [[30u8]]], &Device::Cpu).unwrap();
        let img = tensor_to_image(&tensor).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn tensor_with_alpha_channel_is_rejected() {
        let tensor = Tensor::zeros((4, 2, 2), DType::U8, &Device::Cpu).unwrap();
        assert!(tensor_to_image(&tensor).is_err());
    }

    #[test]
    fn jpeg_output_is_decodable() {
        let tensor = Tensor::ones((3, 16, 24), DType::U8, &Device::Cpu).unwrap();
        let img = tensor_to_image(&tensor).unwrap();
        let bytes = encode_image(&img, ImageFormat::Jpeg).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (24, 16));
    }

    #[test]
    fn rgba_is_flattened_for_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 128])));
        let bytes = encode_image(&img, ImageFormat::Jpeg).unwrap();
        assert!(image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).is_ok());
    }
}
