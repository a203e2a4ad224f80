//! Image to tensor conversion for U-2-Net

use crate::error::{BgRemovalError, Result};
use crate::utils::validation::TensorValidator;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

/// Square edge length of the model input
pub const MODEL_INPUT_SIZE: u32 = 320;

/// Shape of the model input tensor (NCHW)
pub const INPUT_SHAPE: (usize, usize, usize, usize) = (1, 3, 320, 320);

/// Resampling filter used for every resize in the pipeline
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Converts decoded images into the fixed-shape model input tensor
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Decode raw image bytes (format guessed from content)
    ///
    /// # Errors
    /// - The bytes are not a decodable image
    /// - The image has a zero or oversized dimension
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| BgRemovalError::decode(format!("Failed to decode image: {e}")))?;
        TensorValidator::validate_image_dimensions(image.width(), image.height())?;
        Ok(image)
    }

    /// Decode `bytes` and convert them to a `[1, 3, 320, 320]` tensor
    ///
    /// # Errors
    /// - The bytes are not a decodable image
    pub fn to_tensor(bytes: &[u8]) -> Result<Array4<f32>> {
        let image = Self::decode(bytes)?;
        Ok(Self::tensor_from_image(&image))
    }

    /// Drop alpha, stretch to 320x320 and lay the pixels out planar, scaled to `[0, 1]`.
    ///
    /// Aspect ratio is not preserved: the network was trained on stretched inputs.
    #[must_use]
    pub fn tensor_from_image(image: &DynamicImage) -> Array4<f32> {
        let resized = Self::resize_to_input(image);
        Self::rgb_to_tensor(&resized)
    }

    /// RGB8 copy of `image` resized exactly to the model input size
    #[must_use]
    pub fn resize_to_input(image: &DynamicImage) -> RgbImage {
        let rgb = image.to_rgb8();
        if rgb.dimensions() == (MODEL_INPUT_SIZE, MODEL_INPUT_SIZE) {
            return rgb;
        }
        image::imageops::resize(&rgb, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, RESIZE_FILTER)
    }

    fn rgb_to_tensor(rgb: &RgbImage) -> Array4<f32> {
        let (width, height) = rgb.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor allocated from the image dimensions
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] = f32::from(pixel[channel]) / 255.0;
            }
        }

        tensor
    }
}
