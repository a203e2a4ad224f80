//! Model downloading over HTTP(S)
//!
//! Provides the [`ModelFetcher`] seam used by provisioning and the default
//! `reqwest`-based implementation with progress reporting.

use crate::error::{BgRemovalError, Result};
use async_trait::async_trait;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

const READ_BUFFER_SIZE: usize = 8192;

/// Fetches a remote artifact into memory
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Download `url` and return the full response body.
    ///
    /// Implementations must fail on non-success responses and truncated bodies.
    async fn fetch(&self, url: &str, show_progress: bool) -> Result<Vec<u8>>;
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    /// Debug-level log lines at every 10% step
    Log { last_decile: u64 },
    NoOp,
}

impl ProgressIndicator {
    fn for_download(show_progress: bool) -> Self {
        if !show_progress {
            return Self::NoOp;
        }

        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::Log { last_decile: 0 }
        }
    }

    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::Log { .. } => log::debug!("{}", msg),
            Self::NoOp => {},
        }
    }

    /// Record `received` bytes out of an optional total
    pub fn update(&mut self, received: u64, total: Option<u64>) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => {
                if let Some(total) = total {
                    pb.set_length(total);
                    pb.set_position(received);
                } else {
                    pb.set_message(format!("{:.1} MB", received as f64 / 1_048_576.0));
                }
            },
            Self::Log { last_decile } => {
                if let Some(total) = total.filter(|t| *t > 0) {
                    let decile = received.saturating_mul(10) / total;
                    if decile > *last_decile {
                        *last_decile = decile;
                        log::debug!("Downloaded {}/{} bytes ({}%)", received, total, decile * 10);
                    }
                }
            },
            Self::NoOp => {},
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::Log { .. } => log::debug!("{}", msg),
            Self::NoOp => {},
        }
    }
}

/// `reqwest`-backed [`ModelFetcher`] streaming the body with progress reporting
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
}

impl ModelDownloader {
    /// Create a new model downloader
    ///
    /// The client has a connect timeout but no total timeout: the model is
    /// large and slow links must still complete.
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("cleancut/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ModelFetcher for ModelDownloader {
    async fn fetch(&self, url: &str, show_progress: bool) -> Result<Vec<u8>> {
        log::info!("Downloading model from: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP error {status}"),
            ));
        }

        let total_size = response.content_length();
        let mut progress = ProgressIndicator::for_download(show_progress);
        progress.set_message("Downloading model".to_string());

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut body = Vec::with_capacity(
            total_size
                .and_then(|t| usize::try_from(t).ok())
                .unwrap_or(0),
        );
        let mut buffer = vec![0; READ_BUFFER_SIZE];

        loop {
            let bytes_read = match stream.read(&mut buffer).await {
                Ok(n) => n,
                Err(e) => {
                    progress.finish_with_message("Download failed".to_string());
                    return Err(BgRemovalError::network_error(
                        "Failed to read download stream",
                        e,
                    ));
                },
            };

            if bytes_read == 0 {
                break;
            }

            body.extend_from_slice(buffer.get(..bytes_read).unwrap_or(&[]));
            progress.update(body.len() as u64, total_size);
        }

        if let Some(expected) = total_size {
            if body.len() as u64 != expected {
                progress.finish_with_message("Download incomplete".to_string());
                return Err(BgRemovalError::network_error(
                    format!("Truncated download from {url}"),
                    format!("received {} of {} bytes", body.len(), expected),
                ));
            }
        }

        progress.finish_with_message("Model downloaded".to_string());
        log::debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

/// Hex-encoded SHA-256 digest of `bytes`
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Check downloaded bytes against an expected SHA-256 digest
///
/// # Errors
/// - The digest does not match
pub fn verify_integrity(bytes: &[u8], expected_hash: Option<&str>) -> Result<()> {
    let Some(expected) = expected_hash else {
        return Ok(());
    };

    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        log::warn!(
            "Model integrity check failed: expected {}, got {}",
            expected,
            actual
        );
        Err(BgRemovalError::network_error(
            "Model integrity check failed",
            format!("expected sha256 {expected}, got {actual}"),
        ))
    }
}
