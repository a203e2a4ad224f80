//! In-memory cache of initialized inference sessions
//!
//! Loading U-2-Net takes far longer than a forward pass, so initialized
//! backends are kept per model file. Entries are keyed by the model path
//! together with the file's length and modification time: a re-downloaded
//! model gets a fresh session and the stale one is evicted.

use crate::config::BackendType;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::SystemTime;

/// Initialized backend shared between callers
pub type SharedBackend = Arc<Mutex<Box<dyn InferenceBackend>>>;

/// Identity of a loaded session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub backend_type: BackendType,
    pub model_path: PathBuf,
    pub file_len: u64,
    pub modified: Option<SystemTime>,
    pub intra_threads: usize,
}

impl SessionKey {
    /// Build a key from the model file's current metadata
    ///
    /// # Errors
    /// - The model file metadata cannot be read
    pub fn for_model(
        backend_type: BackendType,
        model_path: &Path,
        intra_threads: usize,
    ) -> Result<Self> {
        let meta = std::fs::metadata(model_path)
            .map_err(|e| BgRemovalError::file_io_error("read model metadata", model_path, &e))?;
        Ok(Self {
            backend_type,
            model_path: model_path.to_path_buf(),
            file_len: meta.len(),
            modified: meta.modified().ok(),
            intra_threads,
        })
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.backend_type == other.backend_type
            && self.model_path == other.model_path
            && self.intra_threads == other.intra_threads
    }
}

/// Session cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCacheStats {
    /// Number of cached sessions
    pub entries: usize,
    /// Number of cache hits since creation
    pub hits: u64,
    /// Number of cache misses since creation
    pub misses: u64,
}

impl SessionCacheStats {
    /// Fraction of lookups served from the cache
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe map from [`SessionKey`] to an initialized backend
#[derive(Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<SessionKey, SharedBackend>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache shared by processors created without an explicit one
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<SessionCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<SessionKey, SharedBackend>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Return the cached backend for `key`, or build one with `load` and cache it.
    ///
    /// `load` runs while the cache is locked so concurrent callers never load
    /// the same model twice; call this from a blocking context. The returned
    /// flag is `true` when `load` ran.
    ///
    /// # Errors
    /// - Whatever `load` returns; nothing is cached in that case
    pub fn get_or_try_insert_with<F>(
        &self,
        key: SessionKey,
        load: F,
    ) -> Result<(SharedBackend, bool)>
    where
        F: FnOnce() -> Result<Box<dyn InferenceBackend>>,
    {
        let mut entries = self.lock_entries();

        if let Some(backend) = entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Session cache hit for {}", key.model_path.display());
            return Ok((Arc::clone(backend), false));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Session cache miss for {}", key.model_path.display());

        let backend: SharedBackend = Arc::new(Mutex::new(load()?));

        let before = entries.len();
        entries.retain(|existing, _| !existing.same_slot(&key));
        if entries.len() < before {
            log::debug!("Evicted stale session for {}", key.model_path.display());
        }
        entries.insert(key, Arc::clone(&backend));

        Ok((backend, true))
    }

    /// Drop every cached session, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.lock_entries();
        let removed = entries.len();
        entries.clear();
        removed
    }

    #[must_use]
    pub fn stats(&self) -> SessionCacheStats {
        SessionCacheStats {
            entries: self.lock_entries().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
