//! cleancut command-line tool
//!
//! Removes the background of one image, or manages the cached model with the
//! utility flags.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache},
    config::{BackendType, RemovalConfig},
    processor::BackgroundRemovalProcessor,
    provision::ModelProvisioner,
    services::ConsoleProgressReporter,
    tracing_config::{init_cli_tracing, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Remove image backgrounds with U-2-Net
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "cleancut")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image path
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = [
            "only_download",
            "check_model",
            "clear_cache",
            "show_cache_dir",
        ]
    )]
    pub input: Option<PathBuf>,

    /// Output image path [default: <input stem>_nobg.png]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Directory holding the cached model [env: BG_REMOVER_MODEL_DIR]
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<PathBuf>,

    /// Inference backend
    #[arg(short, long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Number of inference threads (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Load a fresh inference session instead of reusing a cached one
    #[arg(long)]
    pub no_cache: bool,

    /// Hide the download progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// JSON configuration file; flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format on stderr
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Download the model (replacing any cached copy) and exit
    #[arg(long)]
    pub only_download: bool,

    /// Report whether a complete model is cached and exit
    #[arg(long)]
    pub check_model: bool,

    /// Remove the cached model and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Print the model cache location and exit
    #[arg(long)]
    pub show_cache_dir: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Onnx,
    Tract,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

impl From<CliBackend> for BackendType {
    fn from(backend: CliBackend) -> Self {
        match backend {
            CliBackend::Onnx => Self::Onnx,
            CliBackend::Tract => Self::Tract,
        }
    }
}

/// Parse arguments and run the requested command
///
/// # Errors
/// Any failure of the requested command; the binary prints it as `Error: ...`
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    debug!(?config, "Resolved configuration");

    if cli.show_cache_dir {
        return show_cache_dir(&config);
    }

    if cli.clear_cache {
        return clear_cache(&config);
    }

    if cli.check_model {
        return check_model(&config);
    }

    if cli.only_download {
        return download_model_only(&config).await;
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    process_input(&cli, config).await
}

async fn process_input(cli: &Cli, config: RemovalConfig) -> Result<()> {
    let input = cli
        .input
        .clone()
        .context("An input image is required")?;
    let output = CliConfigBuilder::output_path(cli).context("An input image is required")?;

    info!(backend = %config.backend_type, "Starting background removal");

    let mut processor = BackgroundRemovalProcessor::new(config)?;
    // Failures are printed once by the binary; stage events only when asked for
    if cli.verbose > 0 {
        processor = processor.with_progress_reporter(Arc::new(ConsoleProgressReporter::new(true)));
    }

    println!("Processing {}...", input.display());
    let result = processor.process_file(&input, &output).await?;
    println!("Background removed! Saved to: {}", output.display());

    if cli.verbose > 0 {
        println!("   {}", result.timings.summary());
    }

    Ok(())
}

/// Download the model unconditionally and stamp it
async fn download_model_only(config: &RemovalConfig) -> Result<()> {
    let descriptor = config.model_descriptor()?;
    println!("Downloading model from: {}", descriptor.url());

    let provisioner = ModelProvisioner::new(descriptor)
        .context("Failed to create model provisioner")?
        .show_progress(config.show_progress);
    let path = provisioner
        .download_only()
        .await
        .context("Failed to download model")?;

    println!("Model downloaded successfully to: {}", path.display());
    Ok(())
}

/// Report the cached model state without touching the network
fn check_model(config: &RemovalConfig) -> Result<()> {
    let cache = ModelCache::new(config.model_descriptor()?);
    let info = cache.inspect().context("Failed to inspect model cache")?;

    if !info.exists {
        println!("Model not found at: {}", info.path.display());
        println!("The model will be downloaded automatically on first use");
        return Ok(());
    }

    if info.looks_complete() {
        println!("Model verified successfully at: {}", info.path.display());
    } else {
        println!("Warning: model file exists but seems incomplete");
        println!("The model will be re-downloaded on first use if needed");
    }

    println!("   Size: {}", format_size(info.size_bytes));
    match &info.stamped_version {
        Some(version) if info.is_current => println!("   Version: {version}"),
        Some(version) => println!(
            "   Version: {version} (expected {})",
            cache.descriptor().version()
        ),
        None => println!("   Version: unstamped"),
    }
    if let Some(modified) = info.modified {
        println!("   Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
    }

    Ok(())
}

fn clear_cache(config: &RemovalConfig) -> Result<()> {
    let cache = ModelCache::new(config.model_descriptor()?);

    if cache.clear().context("Failed to clear model cache")? {
        println!("Removed cached model: {}", cache.model_path().display());
    } else {
        println!("Cache was already empty: {}", cache.cache_dir().display());
    }
    Ok(())
}

fn show_cache_dir(config: &RemovalConfig) -> Result<()> {
    let descriptor = config.model_descriptor()?;
    println!("Model cache directory: {}", descriptor.model_dir().display());

    let source = if config.model_dir.is_some() {
        "--model-dir, config file or BG_REMOVER_MODEL_DIR"
    } else {
        "platform cache directory"
    };
    println!("   Source: {source}");
    Ok(())
}
