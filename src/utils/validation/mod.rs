//! Validation helpers

pub mod tensor;

pub use tensor::TensorValidator;
