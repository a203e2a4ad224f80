//! Extraction of packaged model artifacts

use crate::error::{BgRemovalError, Result};
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Pull a single file out of an in-memory zip archive.
///
/// With `entry` set, the archive member whose full name or final path
/// component equals it is returned. Without it the archive must hold exactly
/// one file (directories are ignored).
///
/// # Errors
/// - The bytes are not a readable zip archive
/// - The archive holds no files, or more than one when `entry` is `None`
/// - The requested entry is missing or cannot be decompressed
pub fn extract_single_file(bytes: &[u8], entry: Option<&str>) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| BgRemovalError::archive(format!("malformed archive: {e}")))?;

    let mut files = Vec::new();
    for index in 0..archive.len() {
        let file = archive
            .by_index(index)
            .map_err(|e| BgRemovalError::archive(format!("unreadable entry #{index}: {e}")))?;
        if !file.is_dir() {
            files.push((index, file.name().to_string()));
        }
    }

    if files.is_empty() {
        return Err(BgRemovalError::archive("archive contains no files"));
    }

    let (index, name) = match entry {
        Some(wanted) => files
            .into_iter()
            .find(|(_, name)| name == wanted || name.rsplit('/').next() == Some(wanted))
            .ok_or_else(|| {
                BgRemovalError::archive(format!("archive has no entry named '{wanted}'"))
            })?,
        None if files.len() == 1 => files.remove(0),
        None => {
            return Err(BgRemovalError::archive(format!(
                "archive contains {} files; expected exactly one",
                files.len()
            )));
        },
    };

    let mut file = archive
        .by_index(index)
        .map_err(|e| BgRemovalError::archive(format!("unreadable entry '{name}': {e}")))?;
    let mut contents = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut contents)
        .map_err(|e| BgRemovalError::archive(format!("failed to decompress '{name}': {e}")))?;

    log::debug!("Extracted '{}' ({} bytes) from archive", name, contents.len());
    Ok(contents)
}
