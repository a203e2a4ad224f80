//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Canonical U-2-Net model source
pub const DEFAULT_MODEL_URL: &str =
    "https://cdn.jsdelivr.net/gh/danielgatis/rembg@v0.0.0/u2net.onnx";

/// File name of the cached model artifact
pub const MODEL_FILE_NAME: &str = "u2net.onnx";

/// Version tag written to the stamp file; bump to force a re-download
pub const MODEL_VERSION: &str = "1.0.0";

/// Environment variable consulted at the application boundary for the model directory
pub const MODEL_DIR_ENV: &str = "BG_REMOVER_MODEL_DIR";

/// Extension appended to the model path to form the version stamp path
pub const VERSION_STAMP_EXTENSION: &str = "version";

/// How the remote model artifact is packaged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPackaging {
    /// The URL points directly at the model file
    #[default]
    Raw,
    /// The URL points at a zip archive holding the model file.
    ///
    /// `entry` names the file to extract; when `None` the archive must contain
    /// exactly one file.
    Zip { entry: Option<String> },
}

/// Identifies the remote model source, its on-disk location and its version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    url: String,
    local_path: PathBuf,
    version: String,
    #[serde(default)]
    packaging: ModelPackaging,
    #[serde(default)]
    sha256: Option<String>,
}

impl ModelDescriptor {
    /// Create a descriptor for a raw (unpackaged) artifact
    pub fn new<U, P, V>(url: U, local_path: P, version: V) -> Self
    where
        U: Into<String>,
        P: Into<PathBuf>,
        V: Into<String>,
    {
        Self {
            url: url.into(),
            local_path: local_path.into(),
            version: version.into(),
            packaging: ModelPackaging::Raw,
            sha256: None,
        }
    }

    /// Descriptor for the bundled U-2-Net model.
    ///
    /// `model_dir` overrides the cache root; otherwise the user cache
    /// directory is used.
    pub fn u2net(model_dir: Option<&Path>) -> Result<Self> {
        let dir = match model_dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_model_dir()?,
        };
        Ok(Self::new(
            DEFAULT_MODEL_URL,
            dir.join(MODEL_FILE_NAME),
            MODEL_VERSION,
        ))
    }

    /// Built-in model directory: `<user cache dir>/cleancut/models`
    pub fn default_model_dir() -> Result<PathBuf> {
        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Pass a model directory or set {MODEL_DIR_ENV}."
                ))
            })?
            .join("cleancut")
            .join("models"))
    }

    #[must_use]
    pub fn with_packaging(mut self, packaging: ModelPackaging) -> Self {
        self.packaging = packaging;
        self
    }

    /// Require the downloaded artifact to match a hex-encoded SHA-256 digest
    #[must_use]
    pub fn with_sha256<S: Into<String>>(mut self, digest: S) -> Self {
        self.sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn packaging(&self) -> &ModelPackaging {
        &self.packaging
    }

    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    /// Path of the version stamp sidecar (`<model path>.version`)
    #[must_use]
    pub fn stamp_path(&self) -> PathBuf {
        let mut raw: OsString = self.local_path.clone().into_os_string();
        raw.push(".");
        raw.push(VERSION_STAMP_EXTENSION);
        PathBuf::from(raw)
    }

    /// Directory that holds the model and its stamp
    #[must_use]
    pub fn model_dir(&self) -> &Path {
        self.local_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(BgRemovalError::invalid_config("Model URL cannot be empty"));
        }
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            return Err(BgRemovalError::invalid_config(format!(
                "Unsupported model URL '{}': expected http(s)",
                self.url
            )));
        }
        if self.local_path.file_name().is_none() {
            return Err(BgRemovalError::invalid_config(format!(
                "Model path '{}' has no file name",
                self.local_path.display()
            )));
        }
        if self.version.is_empty() {
            return Err(BgRemovalError::invalid_config("Model version cannot be empty"));
        }
        if let Some(digest) = &self.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BgRemovalError::invalid_config(format!(
                    "Invalid SHA-256 digest '{digest}'"
                )));
            }
        }
        Ok(())
    }
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime
    Onnx,
    /// Tract (pure Rust)
    Tract,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "onnx") {
            Self::Onnx
        } else {
            Self::Tract
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl FromStr for BackendType {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" | "ort" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown backend '{other}' (expected onnx or tract)"
            ))),
        }
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Override root directory for the model cache
    pub model_dir: Option<PathBuf>,

    /// Render download progress
    pub show_progress: bool,

    /// Inference backend
    pub backend_type: BackendType,

    /// Reload the inference session on every call instead of reusing a cached one
    pub disable_cache: bool,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            show_progress: true,
            backend_type: BackendType::default(),
            disable_cache: false,
            intra_threads: 0,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use cleancut::{BackendType, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .model_dir("/tmp/models")
    ///     .backend_type(BackendType::Tract)
    ///     .show_progress(false)
    ///     .build()
    ///     .unwrap();
    /// assert!(!config.show_progress);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Fill `model_dir` from [`MODEL_DIR_ENV`] when it is not set explicitly.
    ///
    /// Intended for application entry points; the library itself never reads
    /// the environment.
    #[must_use]
    pub fn with_env_defaults(self) -> Self {
        let from_env = std::env::var_os(MODEL_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        self.with_model_dir_fallback(from_env)
    }

    /// Use `fallback` as the model directory unless one is already configured
    #[must_use]
    pub fn with_model_dir_fallback(mut self, fallback: Option<PathBuf>) -> Self {
        if self.model_dir.is_none() {
            self.model_dir = fallback;
        }
        self
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse config file '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Model descriptor for this configuration
    pub fn model_descriptor(&self) -> Result<ModelDescriptor> {
        ModelDescriptor::u2net(self.model_dir.as_deref())
    }

    /// Validate all configuration parameters
    ///
    /// ```rust
    /// use cleancut::RemovalConfig;
    ///
    /// let mut config = RemovalConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.model_dir = Some("".into());
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.model_dir {
            if dir.as_os_str().is_empty() {
                return Err(BgRemovalError::invalid_config(
                    "Model directory cannot be empty",
                ));
            }
        }

        match self.backend_type {
            BackendType::Onnx if !cfg!(feature = "onnx") => Err(BgRemovalError::invalid_config(
                "ONNX backend requested but the 'onnx' feature is disabled",
            )),
            BackendType::Tract if !cfg!(feature = "tract") => Err(BgRemovalError::invalid_config(
                "Tract backend requested but the 'tract' feature is disabled",
            )),
            _ => Ok(()),
        }
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.config.disable_cache = disable;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RemovalConfig::default();
        assert!(config.model_dir.is_none());
        assert!(config.show_progress);
        assert!(!config.disable_cache);
        assert_eq!(config.intra_threads, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_model_dir_wins_over_fallback() {
        let config = RemovalConfig::builder()
            .model_dir("/explicit")
            .build()
            .unwrap()
            .with_model_dir_fallback(Some(PathBuf::from("/from-env")));
        assert_eq!(config.model_dir, Some(PathBuf::from("/explicit")));

        let config =
            RemovalConfig::default().with_model_dir_fallback(Some(PathBuf::from("/from-env")));
        assert_eq!(config.model_dir, Some(PathBuf::from("/from-env")));
    }

    #[test]
    fn test_descriptor_uses_model_dir() {
        let config = RemovalConfig::builder().model_dir("/models").build().unwrap();
        let descriptor = config.model_descriptor().unwrap();
        assert_eq!(descriptor.local_path(), Path::new("/models/u2net.onnx"));
        assert_eq!(descriptor.stamp_path(), Path::new("/models/u2net.onnx.version"));
        assert_eq!(descriptor.model_dir(), Path::new("/models"));
        assert_eq!(descriptor.version(), MODEL_VERSION);
        assert_eq!(descriptor.url(), DEFAULT_MODEL_URL);
        assert_eq!(descriptor.packaging(), &ModelPackaging::Raw);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(ModelDescriptor::new("", "/m/model.onnx", "1").validate().is_err());
        assert!(ModelDescriptor::new("ftp://host/m.onnx", "/m/model.onnx", "1")
            .validate()
            .is_err());
        assert!(ModelDescriptor::new("https://host/m.onnx", "/m/model.onnx", "")
            .validate()
            .is_err());
        assert!(ModelDescriptor::new("https://host/m.onnx", "/m/model.onnx", "1")
            .with_sha256("not-hex")
            .validate()
            .is_err());
        assert!(ModelDescriptor::new("https://host/m.onnx", "/m/model.onnx", "1")
            .with_sha256("A".repeat(64))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!("onnx".parse::<BackendType>().unwrap(), BackendType::Onnx);
        assert_eq!("TRACT".parse::<BackendType>().unwrap(), BackendType::Tract);
        assert!("cuda".parse::<BackendType>().is_err());
        assert_eq!(BackendType::Tract.to_string(), "tract");
    }

    #[test]
    fn test_config_from_json_file_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cleancut.json");
        std::fs::write(
            &path,
            r#"{ "model_dir": "/srv/models", "show_progress": false }"#,
        )
        .unwrap();

        let config = RemovalConfig::from_json_file(&path).unwrap();
        assert_eq!(config.model_dir, Some(PathBuf::from("/srv/models")));
        assert!(!config.show_progress);
        assert!(!config.disable_cache);
        assert_eq!(config.backend_type, BackendType::default());
    }

    #[test]
    fn test_config_from_json_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.json");
        let err = RemovalConfig::from_json_file(&missing).unwrap_err();
        assert!(err.to_string().contains("read config file"));

        let bad = temp_dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        let err = RemovalConfig::from_json_file(&bad).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_model_dir_rejected() {
        let result = RemovalConfig::builder().model_dir("").build();
        assert!(result.is_err());
    }
}
