//! Tract backend implementation
//!
//! Pure Rust inference with no native dependencies. The input fact is pinned
//! to `[1, 3, 320, 320]` before optimization so the graph is fully typed.

use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::utils::preprocessing::INPUT_SHAPE;
use crate::utils::validation::TensorValidator;
use ndarray::Array4;
use std::path::Path;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

const OUTPUT_DIMS: [usize; 4] = [1, 1, 320, 320];

/// Tract backend for running U-2-Net using pure Rust inference
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    input_name: Option<String>,
    output_name: Option<String>,
    intra_threads: usize,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepted for parity with the ONNX backend; Tract executes on the calling thread
    #[must_use]
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    fn load_model(&mut self, model_path: &Path) -> Result<Duration> {
        let model_load_start = Instant::now();

        log::info!("Initializing Tract backend");
        if self.intra_threads > 1 {
            log::debug!(
                "Tract runs single-threaded; ignoring intra_threads={}",
                self.intra_threads
            );
        }

        let (batch, channels, height, width) = INPUT_SHAPE;
        let inference_model = onnx()
            .model_for_path(model_path)
            .map_err(|e| {
                BgRemovalError::inference(format!(
                    "Failed to load ONNX model '{}': {e}",
                    model_path.display()
                ))
            })?
            .with_input_fact(0, f32::fact([batch, channels, height, width]).into())
            .map_err(|e| BgRemovalError::inference(format!("Failed to set input fact: {e}")))?;

        let input_name = Self::outlet_name(&inference_model, true)?;
        let output_name = Self::outlet_name(&inference_model, false)?;

        let model = inference_model
            .into_optimized()
            .map_err(|e| BgRemovalError::inference(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create runnable model: {e}"))
            })?;

        log::debug!("  - Input: {input_name}, output: {output_name}");

        self.model = Some(model);
        self.input_name = Some(input_name);
        self.output_name = Some(output_name);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }

    /// Name of the node feeding the first graph input or output
    fn outlet_name(model: &InferenceModel, input: bool) -> Result<String> {
        let outlets = if input {
            model.input_outlets()
        } else {
            model.output_outlets()
        }
        .map_err(|e| BgRemovalError::inference(format!("Failed to read model outlets: {e}")))?;

        outlets
            .first()
            .map(|outlet| model.node(outlet.node).name.clone())
            .ok_or_else(|| {
                BgRemovalError::inference(if input {
                    "Model declares no inputs"
                } else {
                    "Model declares no outputs"
                })
            })
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, model_path: &Path) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }

        let model_load_time = self.load_model(model_path)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        TensorValidator::validate_tensor_shape(input, INPUT_SHAPE)?;

        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgRemovalError::internal("Backend not initialized"))?;

        log::debug!("Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?;

        let output_view = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = output_view.shape().to_vec();
        TensorValidator::validate_output_dims(&shape, &OUTPUT_DIMS)?;

        let data: Vec<f32> = output_view.iter().copied().collect();
        let matte = Array4::from_shape_vec((1, 1, 320, 320), data).map_err(|e| {
            BgRemovalError::inference(format!("Failed to reshape output tensor: {e}"))
        })?;

        log::debug!(
            "Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
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
        self.model.is_some()
    }
}
