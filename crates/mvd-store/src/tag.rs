//! Cache tags written back into source directories.
//!
//! A tag is a small `tag.json` file that points a source directory at the
//! canonical entry produced from it. It is only ever written after the
//! entry has been promoted, so a tag never references a missing digest
//! unless the entry was deleted out of band.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mvd_model::{CacheTag, TAG_FILENAME};
use tracing::debug;

use crate::error::StoreError;
use crate::fsio::atomic_write;

/// Location of the tag file inside a source directory.
pub fn tag_path(source_dir: &Path) -> PathBuf {
    source_dir.join(TAG_FILENAME)
}

/// Atomically write (or replace) the tag in `source_dir`.
pub fn write_tag(source_dir: &Path, tag: &CacheTag) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(tag)?;
    atomic_write(source_dir, TAG_FILENAME, &json)?;
    debug!(source = %source_dir.display(), digest = %tag.digest, "tag written");
    Ok(())
}

/// Read the tag in `source_dir`.
///
/// Returns `Ok(None)` when there is no tag; a tag that exists but cannot be
/// parsed is an error so the caller can tell the two apart.
pub fn read_tag(source_dir: &Path) -> Result<Option<CacheTag>, StoreError> {
    let content = match fs::read(tag_path(source_dir)) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::Io(e)),
    };
    let tag = serde_json::from_slice(&content)?;
    Ok(Some(tag))
}

/// Remove the tag from `source_dir`. Returns whether a tag was present.
pub fn clear_tag(source_dir: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(tag_path(source_dir)) {
        Ok(()) => {
            debug!(source = %source_dir.display(), "tag cleared");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Whether `source_dir` carries a tag file.
pub fn has_tag(source_dir: &Path) -> bool {
    tag_path(source_dir).is_file()
}
