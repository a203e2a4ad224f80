//! Model cache management
//!
//! The on-disk cache holds one model file per descriptor plus a sidecar
//! version stamp. A model file without a matching stamp is treated as
//! absent, and so is a matching stamp whose model file is gone.

use crate::config::ModelDescriptor;
use crate::error::{BgRemovalError, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Minimum plausible size of the U-2-Net artifact
pub const COMPLETE_MODEL_MIN_BYTES: u64 = 100_000_000;

/// Information about the cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Path to the cached model file
    pub path: PathBuf,
    /// Whether the model file exists
    pub exists: bool,
    /// Size of the model file in bytes (0 when absent)
    pub size_bytes: u64,
    /// Version recorded in the stamp, if any
    pub stamped_version: Option<String>,
    /// Whether the stamp matches the expected version and the file exists
    pub is_current: bool,
    /// Last modification time of the model file
    pub modified: Option<DateTime<Local>>,
}

impl CachedModelInfo {
    /// Size heuristic: a complete U-2-Net download is larger than 100 MB
    #[must_use]
    pub fn looks_complete(&self) -> bool {
        self.exists && self.size_bytes > COMPLETE_MODEL_MIN_BYTES
    }
}

/// Model cache manager for a single descriptor
#[derive(Debug, Clone)]
pub struct ModelCache {
    descriptor: ModelDescriptor,
}

impl ModelCache {
    #[must_use]
    pub fn new(descriptor: ModelDescriptor) -> Self {
        Self { descriptor }
    }

    #[must_use]
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Path of the cached model file (may not exist)
    #[must_use]
    pub fn model_path(&self) -> &Path {
        self.descriptor.local_path()
    }

    /// Path of the version stamp (may not exist)
    #[must_use]
    pub fn stamp_path(&self) -> PathBuf {
        self.descriptor.stamp_path()
    }

    /// Directory holding the model and its stamp
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        self.descriptor.model_dir()
    }

    /// Read the stamped version; `None` when no stamp exists
    ///
    /// # Errors
    /// - The stamp exists but cannot be read
    pub fn read_stamp(&self) -> Result<Option<String>> {
        let stamp_path = self.stamp_path();
        match fs::read_to_string(&stamp_path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BgRemovalError::file_io_error(
                "read version stamp",
                &stamp_path,
                &e,
            )),
        }
    }

    /// Whether the cached model is present and stamped with the expected version
    ///
    /// # Errors
    /// - The stamp exists but cannot be read
    pub fn is_current(&self) -> Result<bool> {
        let stamped = self.read_stamp()?;
        Ok(stamped.as_deref() == Some(self.descriptor.version()) && self.model_path().is_file())
    }

    /// Remove the version stamp if present
    ///
    /// # Errors
    /// - The stamp exists but cannot be removed
    pub fn remove_stamp(&self) -> Result<()> {
        let stamp_path = self.stamp_path();
        match fs::remove_file(&stamp_path) {
            Ok(()) => {
                log::debug!("Removed stale version stamp {}", stamp_path.display());
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BgRemovalError::file_io_error(
                "remove version stamp",
                &stamp_path,
                &e,
            )),
        }
    }

    /// Atomically write the model file
    ///
    /// # Errors
    /// - The cache directory cannot be created or written
    pub fn write_model(&self, bytes: &[u8]) -> Result<()> {
        write_atomically(self.model_path(), bytes, "write model")
    }

    /// Atomically write the version stamp with the expected version
    ///
    /// # Errors
    /// - The cache directory cannot be written
    pub fn write_stamp(&self) -> Result<()> {
        write_atomically(
            &self.stamp_path(),
            self.descriptor.version().as_bytes(),
            "write version stamp",
        )
    }

    /// Inspect the cache state without touching the network
    ///
    /// # Errors
    /// - The stamp exists but cannot be read
    /// - The model file exists but its metadata cannot be read
    pub fn inspect(&self) -> Result<CachedModelInfo> {
        let path = self.model_path().to_path_buf();
        let stamped_version = self.read_stamp()?;

        let (exists, size_bytes, modified) = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => (
                true,
                meta.len(),
                meta.modified().ok().map(DateTime::<Local>::from),
            ),
            Ok(_) => (false, 0, None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (false, 0, None),
            Err(e) => {
                return Err(BgRemovalError::file_io_error(
                    "read model metadata",
                    &path,
                    &e,
                ));
            },
        };

        let is_current = exists && stamped_version.as_deref() == Some(self.descriptor.version());

        Ok(CachedModelInfo {
            path,
            exists,
            size_bytes,
            stamped_version,
            is_current,
            modified,
        })
    }

    /// Remove the cached model and its stamp
    ///
    /// Returns `true` when anything was removed.
    ///
    /// # Errors
    /// - Either file exists but cannot be removed
    pub fn clear(&self) -> Result<bool> {
        let stamp_existed = self.stamp_path().exists();
        // Stamp first so an interrupted clear never leaves a stamped, missing model
        self.remove_stamp()?;

        let model_path = self.model_path();
        let model_removed = match fs::remove_file(model_path) {
            Ok(()) => {
                log::info!("Removed cached model: {}", model_path.display());
                true
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(BgRemovalError::file_io_error(
                    "remove cached model",
                    model_path,
                    &e,
                ));
            },
        };

        Ok(stamp_existed || model_removed)
    }
}

/// Write `bytes` to a temporary file beside `target`, fsync, then rename over it
pub(crate) fn write_atomically(target: &Path, bytes: &[u8], operation: &str) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir)
        .map_err(|e| BgRemovalError::file_io_error("create directory", dir, &e))?;

    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|e| BgRemovalError::file_io_error("create temporary file", dir, &e))?;
    temp.write_all(bytes)
        .map_err(|e| BgRemovalError::file_io_error(operation, temp.path(), &e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| BgRemovalError::file_io_error("sync temporary file", temp.path(), &e))?;
    temp.persist(target)
        .map_err(|e| BgRemovalError::file_io_error(operation, target, &e.error))?;

    Ok(())
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS.get(unit_index).unwrap_or(&"B");
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_in(dir: &Path) -> ModelCache {
        ModelCache::new(ModelDescriptor::new(
            "https://example.invalid/u2net.onnx",
            dir.join("u2net.onnx"),
            "1.0.0",
        ))
    }

    #[test]
    fn test_paths() {
        let cache = cache_in(Path::new("/models"));
        assert_eq!(cache.model_path(), Path::new("/models/u2net.onnx"));
        assert_eq!(cache.stamp_path(), Path::new("/models/u2net.onnx.version"));
        assert_eq!(cache.cache_dir(), Path::new("/models"));
    }

    #[test]
    fn test_stamp_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(temp_dir.path());

        assert_eq!(cache.read_stamp().unwrap(), None);
        assert!(!cache.is_current().unwrap());

        cache.write_model(b"weights").unwrap();
        assert!(!cache.is_current().unwrap(), "unstamped model is not current");

        cache.write_stamp().unwrap();
        assert_eq!(cache.read_stamp().unwrap().as_deref(), Some("1.0.0"));
        assert!(cache.is_current().unwrap());

        cache.remove_stamp().unwrap();
        cache.remove_stamp().unwrap();
        assert!(!cache.is_current().unwrap());
    }

    #[test]
    fn test_mismatched_stamp_is_not_current() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(temp_dir.path());
        cache.write_model(b"weights").unwrap();
        fs::write(cache.stamp_path(), "0.9.0").unwrap();
        assert!(!cache.is_current().unwrap());

        // Exact match only, no trimming
        fs::write(cache.stamp_path(), "1.0.0\n").unwrap();
        assert!(!cache.is_current().unwrap());
    }

    #[test]
    fn test_stamp_without_model_is_not_current() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(temp_dir.path());
        cache.write_stamp().unwrap();
        assert!(!cache.is_current().unwrap());
    }

    #[test]
    fn test_inspect_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir.path().join("nested"));

        let info = cache.inspect().unwrap();
        assert!(!info.exists);
        assert!(!info.is_current);
        assert!(!info.looks_complete());
        assert!(!cache.clear().unwrap());

        cache.write_model(&[0u8; 2048]).unwrap();
        cache.write_stamp().unwrap();

        let info = cache.inspect().unwrap();
        assert!(info.exists);
        assert!(info.is_current);
        assert_eq!(info.size_bytes, 2048);
        assert_eq!(info.stamped_version.as_deref(), Some("1.0.0"));
        assert!(info.modified.is_some());
        assert!(!info.looks_complete(), "2 KB is far too small for U-2-Net");

        assert!(cache.clear().unwrap());
        assert!(!cache.model_path().exists());
        assert!(!cache.stamp_path().exists());
    }

    #[test]
    fn test_write_atomically_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("out.bin");
        write_atomically(&target, b"first", "write").unwrap();
        write_atomically(&target, b"second", "write").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(176 * 1024 * 1024), "176.0 MB");
        assert_eq!(format_size(1024_u64.pow(4)), "1.0 TB");
    }

    #[test]
    fn test_looks_complete_threshold() {
        let info = CachedModelInfo {
            path: PathBuf::from("/m/u2net.onnx"),
            exists: true,
            size_bytes: COMPLETE_MODEL_MIN_BYTES + 1,
            stamped_version: None,
            is_current: false,
            modified: None,
        };
        assert!(info.looks_complete());
        let info = CachedModelInfo {
            size_bytes: COMPLETE_MODEL_MIN_BYTES,
            ..info
        };
        assert!(!info.looks_complete());
    }
}
