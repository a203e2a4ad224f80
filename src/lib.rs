#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # cleancut
//!
//! Background removal for photographs using the U-2-Net salient object
//! segmentation model. Given an image it produces a PNG of the same size in
//! which background pixels are transparent and foreground pixels keep their
//! color.
//!
//! ## Features
//!
//! - **Model provisioning**: the model is downloaded once into a local cache
//!   directory and guarded by a version stamp
//! - **Two backends**: ONNX Runtime (`onnx` feature) and pure Rust Tract
//!   (`tract` feature)
//! - **Session caching**: initialized sessions are reused across calls
//! - **CLI**: the `cleancut` binary (`cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cleancut::{remove_background, RemovalConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::default().with_env_defaults();
//! remove_background("portrait.jpg", "portrait_nobg.png", &config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## In-memory processing
//!
//! ```rust,no_run
//! use cleancut::{remove_background_from_bytes, RemovalConfig};
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let config = RemovalConfig::builder().show_progress(false).build()?;
//! let result = remove_background_from_bytes(upload, &config).await?;
//! println!("{}x{}", result.dimensions().0, result.dimensions().1);
//! let png: &[u8] = result.as_png_bytes();
//! # let _ = png;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend
//! - `tract` (default): pure Rust backend
//! - `cli` (default): command-line tool, progress bars and tracing setup
//! - `tracing-json`: JSON log output for the CLI
//! - `webp-support`: WebP input decoding
//!
//! Library-only usage:
//!
//! ```toml
//! [dependencies]
//! cleancut = { version = "0.1", default-features = false, features = ["tract"] }
//! ```

pub mod archive;
pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod processor;
pub mod provision;
pub mod services;
pub mod session_cache;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::path::Path;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelInfo, ModelCache, COMPLETE_MODEL_MIN_BYTES};
pub use config::{
    BackendType, ModelDescriptor, ModelPackaging, RemovalConfig, RemovalConfigBuilder,
    DEFAULT_MODEL_URL, MODEL_DIR_ENV, MODEL_FILE_NAME, MODEL_VERSION,
};
pub use download::{ModelDownloader, ModelFetcher};
pub use error::{BgRemovalError, Result};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
pub use processor::{default_output_path, BackgroundRemovalProcessor};
pub use provision::ModelProvisioner;
pub use services::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
pub use session_cache::{SessionCache, SessionCacheStats};
pub use types::{MaskStatistics, ProcessingTimings, RemovalResult, SegmentationMask};
pub use utils::{ImagePreprocessor, MaskPostprocessor, TensorValidator};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background of the image at `input` and write a PNG to `output`
///
/// Provisions the model on first use. The configuration is taken as given;
/// call [`RemovalConfig::with_env_defaults`] first to honor
/// `BG_REMOVER_MODEL_DIR`.
///
/// # Errors
/// - Model provisioning failure (network, integrity, filesystem)
/// - Input cannot be read or decoded
/// - Inference failure
/// - Output cannot be written
pub async fn remove_background<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &RemovalConfig,
) -> Result<()> {
    let processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_file(input, output).await?;
    Ok(())
}

/// Remove the background of an encoded image held in memory
///
/// # Errors
/// - Model provisioning failure
/// - Bytes cannot be decoded
/// - Inference failure
pub async fn remove_background_from_bytes(
    image_bytes: Vec<u8>,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_bytes(image_bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_io() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.jpg");
        let output = temp_dir.path().join("out.png");

        let config = RemovalConfig {
            model_dir: Some(std::path::PathBuf::new()),
            ..RemovalConfig::default()
        };
        let err = remove_background(&input, &output, &config).await.unwrap_err();

        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
        assert!(!output.exists());
    }
}
