//! Model provisioning
//!
//! [`ModelProvisioner`] guarantees that a version-matched model artifact is
//! present on disk before inference. Concurrent provisioning of the same
//! model path within a process is serialized, and every file is written via
//! a temporary file and an atomic rename so a crash never leaves a stamped,
//! partial artifact behind.

use crate::archive;
use crate::cache::ModelCache;
use crate::config::{ModelDescriptor, ModelPackaging};
use crate::download::{verify_integrity, ModelDownloader, ModelFetcher};
use crate::error::{BgRemovalError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

type GuardMap = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

static PROVISION_GUARDS: OnceLock<GuardMap> = OnceLock::new();

/// Async mutex shared by every provisioner targeting `path`
fn guard_for(path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    let guards = PROVISION_GUARDS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guards = match guards.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    Arc::clone(guards.entry(path.to_path_buf()).or_default())
}

/// Canonical spelling of `model_path`, used as the guard key
///
/// The parent directory is created and canonicalized so relative paths and
/// symlinked directories resolve to the same key.
async fn normalized_model_path(model_path: &Path) -> Result<PathBuf> {
    let file_name = model_path.file_name().ok_or_else(|| {
        BgRemovalError::invalid_config(format!(
            "Model path has no file name: {}",
            model_path.display()
        ))
    })?;
    let dir = match model_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| BgRemovalError::file_io_error("create model directory", dir, &e))?;
    let dir = tokio::fs::canonicalize(dir)
        .await
        .map_err(|e| BgRemovalError::file_io_error("resolve model directory", dir, &e))?;

    Ok(dir.join(file_name))
}

async fn run_blocking<T, F>(task: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BgRemovalError::internal(format!("{task} task failed: {e}")))?
}

/// Ensures the model described by a [`ModelDescriptor`] is cached locally
#[derive(Clone)]
pub struct ModelProvisioner {
    cache: ModelCache,
    fetcher: Arc<dyn ModelFetcher>,
    show_progress: bool,
}

impl std::fmt::Debug for ModelProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvisioner")
            .field("cache", &self.cache)
            .field("show_progress", &self.show_progress)
            .finish_non_exhaustive()
    }
}

impl ModelProvisioner {
    /// Create a provisioner that downloads over HTTP(S)
    ///
    /// # Errors
    /// - The descriptor is invalid
    /// - The HTTP client cannot be created
    pub fn new(descriptor: ModelDescriptor) -> Result<Self> {
        descriptor.validate()?;
        Ok(Self::with_fetcher(
            descriptor,
            Arc::new(ModelDownloader::new()?),
        ))
    }

    /// Create a provisioner with a custom fetcher
    #[must_use]
    pub fn with_fetcher(descriptor: ModelDescriptor, fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self {
            cache: ModelCache::new(descriptor),
            fetcher,
            show_progress: false,
        }
    }

    #[must_use]
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &ModelDescriptor {
        self.cache.descriptor()
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Return the local model path, downloading the artifact first if the
    /// version stamp is missing or stale.
    ///
    /// # Errors
    /// - Network failure or non-success HTTP status
    /// - Malformed or empty archive
    /// - Integrity check failure
    /// - Filesystem errors while writing the cache
    pub async fn ensure_model(&self) -> Result<PathBuf> {
        let key = normalized_model_path(self.cache.model_path()).await?;
        let guard = guard_for(&key);
        let _lock = guard.lock().await;

        let cache = self.cache.clone();
        if run_blocking("Stamp check", move || cache.is_current()).await? {
            log::debug!(
                "Model {} is current (version {})",
                self.cache.model_path().display(),
                self.descriptor().version()
            );
            return Ok(self.cache.model_path().to_path_buf());
        }

        log::info!(
            "Model {} missing or outdated, downloading version {}",
            self.cache.model_path().display(),
            self.descriptor().version()
        );
        self.refresh().await
    }

    /// Download and stamp the model unconditionally, replacing any cached copy
    ///
    /// # Errors
    /// Same as [`ModelProvisioner::ensure_model`].
    pub async fn download_only(&self) -> Result<PathBuf> {
        let key = normalized_model_path(self.cache.model_path()).await?;
        let guard = guard_for(&key);
        let _lock = guard.lock().await;
        self.refresh().await
    }

    /// Fetch, unpack, verify, write, then stamp. Caller holds the path guard.
    async fn refresh(&self) -> Result<PathBuf> {
        let descriptor = self.descriptor();

        // A stale stamp must not survive a failed download
        let cache = self.cache.clone();
        run_blocking("Stamp removal", move || cache.remove_stamp()).await?;

        let payload = self
            .fetcher
            .fetch(descriptor.url(), self.show_progress)
            .await?;

        let model_bytes = match descriptor.packaging() {
            ModelPackaging::Raw => payload,
            ModelPackaging::Zip { entry } => {
                let entry = entry.clone();
                run_blocking("Archive extraction", move || {
                    archive::extract_single_file(&payload, entry.as_deref())
                })
                .await?
            },
        };

        verify_integrity(&model_bytes, descriptor.sha256())?;

        let cache = self.cache.clone();
        run_blocking("Model write", move || {
            cache.write_model(&model_bytes)?;
            cache.write_stamp()
        })
        .await?;

        log::info!(
            "Model downloaded successfully to: {}",
            self.cache.model_path().display()
        );
        Ok(self.cache.model_path().to_path_buf())
    }
}
