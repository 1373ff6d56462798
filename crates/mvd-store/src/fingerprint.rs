//! Source directory fingerprints.
//!
//! A fingerprint is a digest over the sorted `(relative path, size, mtime)`
//! triples of every regular file in a source directory. It is recorded in
//! the cache tag so that a later lookup can tell whether the source was
//! edited since it was ingested, without re-parsing anything.

use std::path::Path;
use std::time::UNIX_EPOCH;

use mvd_model::TAG_FILENAME;
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::hasher::digest_bytes;

/// Compute the fingerprint of `source_dir`.
///
/// The tag file and its in-flight temp files are excluded, so writing a
/// tag does not change the fingerprint it records.
pub fn source_fingerprint(source_dir: &Path) -> Result<String, StoreError> {
    if !source_dir.is_dir() {
        return Err(StoreError::SourceNotFound(source_dir.to_path_buf()));
    }

    let mut lines = String::new();
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(source_dir) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if is_tag_file(rel) {
            continue;
        }

        let meta = entry.metadata().map_err(|e| StoreError::Io(e.into()))?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();

        lines.push_str(&format!(
            "{}\t{}\t{}.{:09}\n",
            rel.to_string_lossy(),
            meta.len(),
            mtime.as_secs(),
            mtime.subsec_nanos()
        ));
    }

    Ok(digest_bytes(lines.as_bytes()))
}

fn is_tag_file(rel: &Path) -> bool {
    if rel.components().count() != 1 {
        return false;
    }
    let name = rel.to_string_lossy();
    name == TAG_FILENAME || name.starts_with(&format!(".{}.tmp", TAG_FILENAME))
}
