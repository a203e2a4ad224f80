//! Image and tensor utilities shared by the pipeline

pub mod postprocessing;
pub mod preprocessing;
pub mod validation;

pub use postprocessing::MaskPostprocessor;
pub use preprocessing::{ImagePreprocessor, INPUT_SHAPE, MODEL_INPUT_SIZE};
pub use validation::TensorValidator;
