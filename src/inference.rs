//! Inference backend abstraction and factory

use crate::config::{BackendType, RemovalConfig};
use crate::error::Result;
use ndarray::Array4;
use std::path::Path;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// Backends discover their input and output tensor names from the loaded
/// model; nothing about the graph's naming is assumed.
pub trait InferenceBackend: Send {
    /// Load the model at `model_path`
    ///
    /// Returns the load time, or `None` if the backend was already initialized.
    ///
    /// # Errors
    /// - The model file cannot be read or parsed
    /// - The engine rejects the graph
    fn initialize(&mut self, model_path: &Path) -> Result<Option<Duration>>;

    /// Run a forward pass on a `[1, 3, 320, 320]` tensor, returning the `[1, 1, 320, 320]` matte
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Engine execution failure
    /// - Output tensor of unexpected shape
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Name of the model input discovered at load time
    fn input_name(&self) -> Option<&str>;

    /// Name of the model output discovered at load time
    fn output_name(&self) -> Option<&str>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Creates inference backends; lets the processor be driven by mock engines
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the requested type
    ///
    /// # Errors
    /// - The backend type is not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        config: &RemovalConfig,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// Backend types this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the ONNX Runtime and Tract backends enabled at compile time
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        config: &RemovalConfig,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            BackendType::Onnx => {
                #[cfg(feature = "onnx")]
                {
                    Ok(Box::new(
                        crate::backends::OnnxBackend::new()
                            .with_intra_threads(config.intra_threads),
                    ))
                }
                #[cfg(not(feature = "onnx"))]
                {
                    let _ = config;
                    Err(crate::error::BgRemovalError::invalid_config(
                        "ONNX backend not compiled in (enable the 'onnx' feature)",
                    ))
                }
            },
            BackendType::Tract => {
                #[cfg(feature = "tract")]
                {
                    Ok(Box::new(
                        crate::backends::TractBackend::new()
                            .with_intra_threads(config.intra_threads),
                    ))
                }
                #[cfg(not(feature = "tract"))]
                {
                    let _ = config;
                    Err(crate::error::BgRemovalError::invalid_config(
                        "Tract backend not compiled in (enable the 'tract' feature)",
                    ))
                }
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        backends
    }
}

/// Resolve the number of intra-op threads (0 = all available cores)
#[must_use]
pub fn resolve_intra_threads(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4)
    }
}
