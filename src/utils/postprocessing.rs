//! Matte to alpha channel conversion and PNG output

use crate::error::{BgRemovalError, Result};
use crate::types::SegmentationMask;
use crate::utils::preprocessing::{ImagePreprocessor, MODEL_INPUT_SIZE, RESIZE_FILTER};
use crate::utils::validation::TensorValidator;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, Rgba, RgbaImage};
use ndarray::{Array4, Axis};

/// Shape of the model output tensor (NCHW)
pub const MATTE_SHAPE: (usize, usize, usize, usize) = (1, 1, 320, 320);

/// Turns the model's soft matte into an alpha channel and composites it
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Compose the transparent PNG for `original_bytes`.
    ///
    /// The original is re-decoded so only the bytes and the matte cross the
    /// inference boundary.
    ///
    /// # Errors
    /// - The original bytes cannot be decoded
    /// - The matte is not `[1, 1, 320, 320]`
    /// - PNG encoding fails
    pub fn compose(
        original_bytes: &[u8],
        matte: &Array4<f32>,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>> {
        let original = ImagePreprocessor::decode(original_bytes)?;
        let (png, _) = Self::compose_image(&original, matte, width, height)?;
        Ok(png)
    }

    /// Compose from an already decoded original, returning the PNG and the alpha mask
    ///
    /// # Errors
    /// - The matte is not `[1, 1, 320, 320]`
    /// - PNG encoding fails
    pub fn compose_image(
        original: &DynamicImage,
        matte: &Array4<f32>,
        width: u32,
        height: u32,
    ) -> Result<(Vec<u8>, SegmentationMask)> {
        let mask = Self::matte_to_mask(matte, width, height)?;
        let rgba = Self::apply_alpha(original, &mask)?;
        let png = Self::encode_png(&rgba)?;
        Ok((png, mask))
    }

    /// Alpha mask at `width x height` derived from the matte.
    ///
    /// Computed as `255 - resize(round((1 - v) * 255))`. The two inversions
    /// do not cancel: rounding happens before the resample.
    ///
    /// # Errors
    /// - The matte is not `[1, 1, 320, 320]`
    pub fn matte_to_mask(matte: &Array4<f32>, width: u32, height: u32) -> Result<SegmentationMask> {
        TensorValidator::validate_image_dimensions(width, height)?;
        let inverted = Self::inverted_matte(matte)?;

        let resized = if (width, height) == inverted.dimensions() {
            inverted
        } else {
            image::imageops::resize(&inverted, width, height, RESIZE_FILTER)
        };

        let alpha: Vec<u8> = resized.into_raw().into_iter().map(|v| 255 - v).collect();
        TensorValidator::validate_mask_dimensions(alpha.len(), width, height)?;
        Ok(SegmentationMask::new(alpha, (width, height)))
    }

    /// 320x320 grayscale of `round((1 - v) * 255)`, clamped to a byte
    fn inverted_matte(matte: &Array4<f32>) -> Result<GrayImage> {
        TensorValidator::validate_tensor_shape(matte, MATTE_SHAPE)?;

        let non_finite = TensorValidator::count_non_finite(matte);
        if non_finite > 0 {
            tracing::warn!(
                count = non_finite,
                "Matte contains non-finite values, treating as background"
            );
        }

        let plane = matte.index_axis(Axis(0), 0);
        let plane = plane.index_axis(Axis(0), 0);
        let data: Vec<u8> = plane.iter().map(|&v| Self::invert_to_byte(v)).collect();

        GrayImage::from_raw(MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, data)
            .ok_or_else(|| BgRemovalError::internal("Matte buffer size mismatch"))
    }

    // Value clamped to [0, 255] before the cast
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn invert_to_byte(value: f32) -> u8 {
        let value = if value.is_finite() { value } else { 0.0 };
        ((1.0 - value) * 255.0).round().clamp(0.0, 255.0) as u8
    }

    /// RGBA image with the original RGB and `mask` as alpha
    ///
    /// # Errors
    /// - The mask length does not match its dimensions
    pub fn apply_alpha(original: &DynamicImage, mask: &SegmentationMask) -> Result<RgbaImage> {
        let (width, height) = mask.dimensions;
        let mut rgb = original.to_rgb8();
        if rgb.dimensions() != (width, height) {
            rgb = image::imageops::resize(&rgb, width, height, RESIZE_FILTER);
        }
        TensorValidator::validate_mask_dimensions(mask.data.len(), width, height)?;

        let mut rgba = RgbaImage::new(width, height);
        for ((out, src), alpha) in rgba.pixels_mut().zip(rgb.pixels()).zip(&mask.data) {
            *out = Rgba([src[0], src[1], src[2], *alpha]);
        }
        Ok(rgba)
    }

    /// Encode an RGBA image as PNG
    ///
    /// # Errors
    /// - The encoder rejects the image
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| BgRemovalError::output(format!("Failed to encode PNG: {e}")))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn uniform_matte(value: f32) -> Array4<f32> {
        Array4::from_elem(MATTE_SHAPE, value)
    }

    #[test]
    fn test_invert_to_byte() {
        assert_eq!(MaskPostprocessor::invert_to_byte(1.0), 0);
        assert_eq!(MaskPostprocessor::invert_to_byte(0.0), 255);
        assert_eq!(MaskPostprocessor::invert_to_byte(0.5), 128);
        assert_eq!(MaskPostprocessor::invert_to_byte(1.7), 0);
        assert_eq!(MaskPostprocessor::invert_to_byte(-0.3), 255);
        assert_eq!(MaskPostprocessor::invert_to_byte(f32::NAN), 255);
    }

    #[test]
    fn test_uniform_matte_gives_uniform_alpha() {
        let mask = MaskPostprocessor::matte_to_mask(&uniform_matte(1.0), 500, 500).unwrap();
        assert_eq!(mask.dimensions, (500, 500));
        assert!(mask.data.iter().all(|&a| a == 255));

        let mask = MaskPostprocessor::matte_to_mask(&uniform_matte(0.0), 64, 48).unwrap();
        assert!(mask.data.iter().all(|&a| a == 0));

        // 0.5 inverts to 128, back to 127
        let mask = MaskPostprocessor::matte_to_mask(&uniform_matte(0.5), 320, 320).unwrap();
        assert!(mask.data.iter().all(|&a| a == 127));
    }

    #[test]
    fn test_matte_rows_keep_orientation() {
        let mut matte = uniform_matte(0.0);
        for x in 0..320 {
            for y in 0..160 {
                matte[[0, 0, y, x]] = 1.0;
            }
        }
        let mask = MaskPostprocessor::matte_to_mask(&matte, 320, 320).unwrap();
        assert_eq!(mask.data[0], 255, "top row is foreground");
        assert_eq!(mask.data[319 * 320], 0, "bottom row is background");
    }

    #[test]
    fn test_wrong_matte_shape() {
        let matte = Array4::<f32>::zeros((1, 1, 160, 160));
        let err = MaskPostprocessor::matte_to_mask(&matte, 10, 10).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
    }

    #[test]
    fn test_compose_keeps_rgb_and_dimensions() {
        let original =
            DynamicImage::ImageRgb8(ImageBuffer::from_pixel(500, 500, Rgb([12, 34, 56])));
        let mut bytes = Vec::new();
        original
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let png = MaskPostprocessor::compose(&bytes, &uniform_matte(1.0), 500, 500).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgba8);

        let rgba = decoded.to_rgba8();
        assert_eq!(rgba.dimensions(), (500, 500));
        assert!(rgba.pixels().all(|p| p.0 == [12, 34, 56, 255]));
    }

    #[test]
    fn test_compose_image_returns_mask() {
        let original = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(40, 30, Rgb([1, 2, 3])));
        let (png, mask) =
            MaskPostprocessor::compose_image(&original, &uniform_matte(0.0), 40, 30).unwrap();
        assert_eq!(mask.statistics().foreground_pixels, 0);
        assert!(!png.is_empty());
    }
}
