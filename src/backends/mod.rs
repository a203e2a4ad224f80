//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (default)
//! - Tract backend (pure Rust, no native dependencies)
//! - Mock backend for tests and benchmarks

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub mod test_utils;

// Re-export backends based on enabled features
#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

pub use self::test_utils::{MockBackend, MockBackendFactory, MockMatte};
