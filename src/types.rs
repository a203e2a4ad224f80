//! Core types for background removal operations

use crate::error::{BgRemovalError, Result};
use image::{GrayImage, ImageBuffer};
use serde::{Deserialize, Serialize};

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// PNG-encoded RGBA output
    pub png_bytes: Vec<u8>,

    /// The alpha mask used for compositing
    pub mask: SegmentationMask,

    /// Original image dimensions (width, height)
    pub original_dimensions: (u32, u32),

    /// Per-stage timings
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    #[must_use]
    pub fn new(
        png_bytes: Vec<u8>,
        mask: SegmentationMask,
        original_dimensions: (u32, u32),
        timings: ProcessingTimings,
    ) -> Self {
        Self {
            png_bytes,
            mask,
            original_dimensions,
            timings,
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.original_dimensions
    }

    /// Encoded output as bytes
    #[must_use]
    pub fn as_png_bytes(&self) -> &[u8] {
        &self.png_bytes
    }

    /// Decode the PNG output back into an RGBA image
    pub fn to_rgba_image(&self) -> Result<image::RgbaImage> {
        let decoded = image::load_from_memory_with_format(&self.png_bytes, image::ImageFormat::Png)
            .map_err(|e| BgRemovalError::output(format!("Failed to decode result PNG: {e}")))?;
        Ok(decoded.to_rgba8())
    }
}

/// Alpha mask at the original image resolution (255 = foreground)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255), row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self::new(image.as_raw().clone(), image.dimensions())
    }

    /// Convert mask to a grayscale image
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        ImageBuffer::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::internal(format!(
                "Mask data length {} does not match {}x{}",
                self.data.len(),
                width,
                height
            ))
        })
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let background_pixels = total_pixels - foreground_pixels;

        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio,
        }
    }
}

/// Statistics about a segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
}

/// Timing breakdown for one background removal call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model provisioning (cache check, plus download on a miss)
    pub provisioning_ms: u64,

    /// Image decoding
    pub image_decode_ms: u64,

    /// Resize and tensor conversion
    pub preprocessing_ms: u64,

    /// Session creation; zero when a cached session was reused
    pub model_load_ms: u64,

    /// Forward pass
    pub inference_ms: u64,

    /// Matte resize and alpha compositing
    pub postprocessing_ms: u64,

    /// PNG encoding
    pub image_encode_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Fraction of total time spent in the forward pass
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// One-line human readable breakdown
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "total {}ms (provision {}ms, decode {}ms, preprocess {}ms, load {}ms, inference {}ms, postprocess {}ms, encode {}ms)",
            self.total_ms,
            self.provisioning_ms,
            self.image_decode_ms,
            self.preprocessing_ms,
            self.model_load_ms,
            self.inference_ms,
            self.postprocessing_ms,
            self.image_encode_ms
        )
    }
}
