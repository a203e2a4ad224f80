//! ONNX Runtime backend
//!
//! CPU execution only. The session is built from the cached model file with
//! full graph optimization; input and output names are read from the session
//! metadata after loading.

use crate::error::{BgRemovalError, Result};
use crate::inference::{resolve_intra_threads, InferenceBackend};
use crate::utils::preprocessing::INPUT_SHAPE;
use crate::utils::validation::TensorValidator;
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Expected matte dimensions as reported by the engine
const OUTPUT_DIMS: [usize; 4] = [1, 1, 320, 320];

/// ONNX Runtime backend for U-2-Net
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    input_name: Option<String>,
    output_name: Option<String>,
    intra_threads: usize,
}

impl OnnxBackend {
    /// Create a new uninitialized ONNX backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of intra-op threads (0 = all available cores)
    #[must_use]
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    fn load_model(&mut self, model_path: &Path) -> Result<Duration> {
        let model_load_start = Instant::now();
        let intra_threads = resolve_intra_threads(self.intra_threads);

        let session = Session::builder()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                BgRemovalError::inference(format!(
                    "Failed to load model '{}': {e}",
                    model_path.display()
                ))
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| BgRemovalError::inference("Model declares no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| BgRemovalError::inference("Model declares no outputs"))?;

        log::debug!("ONNX Runtime session created");
        log::debug!("  - Model: {}", model_path.display());
        log::debug!("  - Input: {input_name}, output: {output_name}");
        log::debug!("  - Threading: {intra_threads} intra-op threads");
        log::debug!("  - Optimization level: Level3");

        self.session = Some(session);
        self.input_name = Some(input_name);
        self.output_name = Some(output_name);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, model_path: &Path) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }

        let model_load_time = self.load_model(model_path)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        TensorValidator::validate_tensor_shape(input, INPUT_SHAPE)?;

        let (Some(session), Some(input_name), Some(output_name)) = (
            self.session.as_mut(),
            self.input_name.as_deref(),
            self.output_name.as_deref(),
        ) else {
            return Err(BgRemovalError::internal("Backend not initialized"));
        };

        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session
            .run(ort::inputs![input_name => input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let output = outputs
            .get(output_name)
            .ok_or_else(|| {
                BgRemovalError::inference(format!("Output tensor '{output_name}' not found"))
            })?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to extract output tensor: {e}"))
            })?;

        let shape = output.shape().to_vec();
        TensorValidator::validate_output_dims(&shape, &OUTPUT_DIMS)?;

        let data: Vec<f32> = output.iter().copied().collect();
        let matte = Array4::from_shape_vec((1, 1, 320, 320), data).map_err(|e| {
            BgRemovalError::inference(format!("Failed to reshape output tensor: {e}"))
        })?;

        log::debug!(
            "Inference completed in {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(matte)
    }

    fn input_name(&self) -> Option<&str> {
        self.input_name.as_deref()
    }

    fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_onnx_backend_creation() {
        let backend = OnnxBackend::new().with_intra_threads(2);
        assert!(!backend.is_initialized());
        assert!(backend.input_name().is_none());
        assert!(backend.output_name().is_none());
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = OnnxBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 320, 320));
        let err = backend.infer(&input).unwrap_err();
        assert!(matches!(err, BgRemovalError::Internal(_)));
    }

    #[test]
    fn test_infer_rejects_wrong_input_shape() {
        let mut backend = OnnxBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 224, 224));
        let err = backend.infer(&input).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
    }

    #[test]
    fn test_initialize_with_invalid_model_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("u2net.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();

        let mut backend = OnnxBackend::new();
        let err = backend.initialize(&path).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
        assert!(!backend.is_initialized());
    }
}
