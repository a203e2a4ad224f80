//! Mock backends for exercising the pipeline without a real model
//!
//! Used by unit tests, the integration suite and the benchmarks. The mock
//! still requires the model path to exist, like the real engines do.

use crate::{
    config::{BackendType, RemovalConfig},
    error::{BgRemovalError, Result},
    inference::{BackendFactory, InferenceBackend},
    utils::preprocessing::INPUT_SHAPE,
    utils::validation::TensorValidator,
};
use instant::Duration;
use ndarray::Array4;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Matte produced by a [`MockBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum MockMatte {
    /// Every pixel has the same foreground confidence
    Uniform(f32),
    /// Soft-edged disc centered in the frame, background elsewhere
    Circle,
    /// Tensor returned as-is, whatever its shape
    Fixed(Array4<f32>),
}

impl MockMatte {
    fn render(&self) -> Array4<f32> {
        match self {
            Self::Uniform(value) => Array4::from_elem((1, 1, 320, 320), *value),
            Self::Circle => circle_matte(320),
            Self::Fixed(tensor) => tensor.clone(),
        }
    }
}

/// Soft circular matte of `size x size`
#[must_use]
pub fn circle_matte(size: usize) -> Array4<f32> {
    let center = size as f32 / 2.0;
    let radius = (size as f32 / 3.0).max(10.0);

    Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < radius {
            ((radius - distance) / radius * 4.0).clamp(0.0, 1.0)
        } else {
            0.0
        }
    })
}

/// Deterministic [`InferenceBackend`] with call counters
#[derive(Debug, Clone)]
pub struct MockBackend {
    matte: MockMatte,
    initialized: bool,
    fail_inference: bool,
    inferences: Arc<AtomicUsize>,
    last_input: Arc<Mutex<Option<Array4<f32>>>>,
}

impl MockBackend {
    #[must_use]
    pub fn new(matte: MockMatte) -> Self {
        Self {
            matte,
            initialized: false,
            fail_inference: false,
            inferences: Arc::new(AtomicUsize::new(0)),
            last_input: Arc::new(Mutex::new(None)),
        }
    }

    /// Backend whose forward pass always fails
    #[must_use]
    pub fn failing() -> Self {
        let mut backend = Self::new(MockMatte::Uniform(0.0));
        backend.fail_inference = true;
        backend
    }

    /// Number of completed forward passes, shared across clones
    #[must_use]
    pub fn inference_count(&self) -> usize {
        self.inferences.load(Ordering::SeqCst)
    }

    /// Input tensor of the most recent forward pass
    #[must_use]
    pub fn last_input(&self) -> Option<Array4<f32>> {
        self.last_input.lock().ok().and_then(|guard| guard.clone())
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, model_path: &Path) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        if !model_path.is_file() {
            return Err(BgRemovalError::inference(format!(
                "Model file '{}' not found",
                model_path.display()
            )));
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }
        TensorValidator::validate_tensor_shape(input, INPUT_SHAPE)?;
        if self.fail_inference {
            return Err(BgRemovalError::inference("Mock inference failure"));
        }

        if let Ok(mut last) = self.last_input.lock() {
            *last = Some(input.clone());
        }
        self.inferences.fetch_add(1, Ordering::SeqCst);

        let matte = self.matte.render();
        let shape = matte.shape().to_vec();
        TensorValidator::validate_output_dims(&shape, &[1, 1, 320, 320])?;
        Ok(matte)
    }

    fn input_name(&self) -> Option<&str> {
        self.initialized.then_some("input.1")
    }

    fn output_name(&self) -> Option<&str> {
        self.initialized.then_some("1959")
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// [`BackendFactory`] that hands out clones of a template [`MockBackend`]
#[derive(Debug, Clone)]
pub struct MockBackendFactory {
    template: MockBackend,
    created: Arc<AtomicUsize>,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(template: MockBackend) -> Self {
        Self {
            template,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn uniform(value: f32) -> Self {
        Self::new(MockBackend::new(MockMatte::Uniform(value)))
    }

    /// Number of backends created so far
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Forward passes across every backend this factory created
    #[must_use]
    pub fn inference_count(&self) -> usize {
        self.template.inference_count()
    }

    /// The template backend, sharing counters with every created backend
    #[must_use]
    pub fn template(&self) -> &MockBackend {
        &self.template
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _config: &RemovalConfig,
    ) -> Result<Box<dyn InferenceBackend>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.template.clone()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mock_requires_model_file() {
        let mut backend = MockBackend::new(MockMatte::Circle);
        assert!(backend.initialize(Path::new("/nonexistent/u2net.onnx")).is_err());

        let model = NamedTempFile::new().unwrap();
        assert!(backend.initialize(model.path()).unwrap().is_some());
        assert!(backend.initialize(model.path()).unwrap().is_none());
        assert_eq!(backend.input_name(), Some("input.1"));
    }

    #[test]
    fn test_mock_counts_and_records_input() {
        let model = NamedTempFile::new().unwrap();
        let mut backend = MockBackend::new(MockMatte::Uniform(0.25));
        let observer = backend.clone();
        backend.initialize(model.path()).unwrap();

        let input = Array4::from_elem((1, 3, 320, 320), 0.5);
        let matte = backend.infer(&input).unwrap();

        assert_eq!(matte.shape(), &[1, 1, 320, 320]);
        assert_eq!(observer.inference_count(), 1);
        assert_eq!(observer.last_input(), Some(input));
    }

    #[test]
    fn test_fixed_matte_with_wrong_shape_is_rejected() {
        let model = NamedTempFile::new().unwrap();
        let mut backend = MockBackend::new(MockMatte::Fixed(Array4::zeros((1, 2, 320, 320))));
        backend.initialize(model.path()).unwrap();

        let err = backend.infer(&Array4::zeros((1, 3, 320, 320))).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
    }

    #[test]
    fn test_circle_matte_is_centered() {
        let matte = circle_matte(320);
        assert!((matte[[0, 0, 160, 160]] - 1.0).abs() < f32::EPSILON);
        assert!(matte[[0, 0, 0, 0]].abs() < f32::EPSILON);
    }

    #[test]
    fn test_factory_shares_counters() {
        let model = NamedTempFile::new().unwrap();
        let factory = MockBackendFactory::uniform(1.0);
        let mut backend = factory
            .create_backend(BackendType::Onnx, &RemovalConfig::default())
            .unwrap();
        backend.initialize(model.path()).unwrap();
        backend.infer(&Array4::zeros((1, 3, 320, 320))).unwrap();

        assert_eq!(factory.created_count(), 1);
        assert_eq!(factory.inference_count(), 1);
    }
}
