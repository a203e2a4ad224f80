//! Tensor validation utilities
//!
//! Shape and dimension checks applied at the boundaries of the inference
//! engine and the postprocessor.

use crate::error::{BgRemovalError, Result};
use ndarray::{ArrayBase, Data, Ix4};

/// Validator for tensor operations and shape validation
pub struct TensorValidator;

impl TensorValidator {
    /// Validate tensor shape matches expected dimensions
    pub fn validate_tensor_shape<S: Data<Elem = f32>>(
        tensor: &ArrayBase<S, Ix4>,
        expected_shape: (usize, usize, usize, usize),
    ) -> Result<()> {
        let actual = tensor.dim();
        if actual != expected_shape {
            let (batch, channels, height, width) = expected_shape;
            return Err(BgRemovalError::inference(format!(
                "Tensor shape mismatch. Expected [{}, {}, {}, {}], got [{}, {}, {}, {}]",
                batch, channels, height, width, actual.0, actual.1, actual.2, actual.3
            )));
        }
        Ok(())
    }

    /// Validate a dynamically shaped engine output before reshaping it
    pub fn validate_output_dims(shape: &[usize], expected: &[usize]) -> Result<()> {
        if shape.len() != expected.len() {
            return Err(BgRemovalError::inference(format!(
                "Model output must have {} dimensions, got {} ({:?})",
                expected.len(),
                shape.len(),
                shape
            )));
        }
        if shape != expected {
            return Err(BgRemovalError::inference(format!(
                "Model output shape mismatch. Expected {:?}, got {:?}",
                expected, shape
            )));
        }
        Ok(())
    }

    /// Validate decoded image dimensions are non-zero
    pub fn validate_image_dimensions(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::decode(format!(
                "Image dimensions too small: {width}x{height}"
            )));
        }
        Ok(())
    }

    /// Validate mask data length matches the target dimensions
    pub fn validate_mask_dimensions(mask_data_len: usize, width: u32, height: u32) -> Result<()> {
        let expected_len = width as usize * height as usize;
        if mask_data_len != expected_len {
            return Err(BgRemovalError::internal(format!(
                "Mask data length {} doesn't match image dimensions {}x{} (expected {} pixels)",
                mask_data_len, width, height, expected_len
            )));
        }
        Ok(())
    }

    /// Number of NaN or infinite values in a tensor
    pub fn count_non_finite<S: Data<Elem = f32>>(tensor: &ArrayBase<S, Ix4>) -> usize {
        tensor.iter().filter(|v| !v.is_finite()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_validate_tensor_shape() {
        let tensor = Array4::<f32>::zeros((1, 1, 320, 320));
        assert!(TensorValidator::validate_tensor_shape(&tensor, (1, 1, 320, 320)).is_ok());

        let err = TensorValidator::validate_tensor_shape(&tensor, (1, 3, 320, 320)).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
        assert!(TensorValidator::validate_tensor_shape(&tensor.view(), (2, 1, 320, 320)).is_err());
    }

    #[test]
    fn test_validate_output_dims() {
        assert!(
            TensorValidator::validate_output_dims(&[1, 1, 320, 320], &[1, 1, 320, 320]).is_ok()
        );
        assert!(TensorValidator::validate_output_dims(&[1, 320, 320], &[1, 1, 320, 320]).is_err());
        assert!(
            TensorValidator::validate_output_dims(&[1, 1, 160, 160], &[1, 1, 320, 320]).is_err()
        );
    }

    #[test]
    fn test_validate_image_dimensions() {
        assert!(TensorValidator::validate_image_dimensions(1, 1).is_ok());
        assert!(TensorValidator::validate_image_dimensions(20000, 1080).is_ok());
        assert!(matches!(
            TensorValidator::validate_image_dimensions(0, 100),
            Err(BgRemovalError::Decode(_))
        ));
    }

    #[test]
    fn test_validate_mask_dimensions() {
        assert!(TensorValidator::validate_mask_dimensions(1000, 25, 40).is_ok());
        assert!(TensorValidator::validate_mask_dimensions(999, 25, 40).is_err());
    }

    #[test]
    fn test_count_non_finite() {
        let mut tensor = Array4::<f32>::from_elem((1, 1, 2, 2), 0.5);
        assert_eq!(TensorValidator::count_non_finite(&tensor), 0);
        tensor[[0, 0, 0, 1]] = f32::NAN;
        tensor[[0, 0, 1, 1]] = f32::INFINITY;
        assert_eq!(TensorValidator::count_non_finite(&tensor), 2);
    }
}
