//! Small filesystem helpers shared by the store modules.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Hidden temp path next to `filename` inside `dir`, unique per call.
pub fn temp_path(dir: &Path, filename: &str) -> PathBuf {
    let nonce = ulid::Ulid::new().to_string().to_lowercase();
    dir.join(format!(".{}.tmp.{}", filename, nonce))
}

/// Atomic write using write-then-rename
///
/// Readers either see the previous content or the full new content, never
/// a partial file under `filename`.
pub fn atomic_write(dir: &Path, filename: &str, content: &[u8]) -> io::Result<()> {
    let final_path = dir.join(filename);
    let temp_path = temp_path(dir, filename);

    if let Err(e) = fs::write(&temp_path, content) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp_path, &final_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Total size of regular files under `path`.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
