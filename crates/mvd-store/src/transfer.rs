//! Deduplicating file transfer.
//!
//! Copies a raw file from a source directory into an entry directory,
//! optionally renaming it by the SHA-256 of its bytes
//! (`<sha256>-<basename>[.gz]`) so identical contents collapse to one
//! stored name. Bytes are hashed in the same pass that writes them to a
//! hidden temp file, and the temp file is renamed into place once fully
//! written; the final name never exists with partial content and always
//! names the bytes that were actually stored.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StoreError;
use crate::fsio::{atomic_write, temp_path};
use crate::hasher::{digest_file, digest_serializable};

/// Compression applied to stored raw files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
}

impl Compression {
    /// File name suffix (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => "gz",
        }
    }
}

/// Shape of the name returned by [`transfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// Stored file name only: `ab12...-OUTCAR.gz`
    #[default]
    Base,
    /// `dst_dir` joined with the stored name, as given
    Relative,
    /// Absolute path of the stored file
    Absolute,
}

/// Options for [`transfer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Prefix the stored name with the digest of the file bytes
    #[serde(default = "default_rename")]
    pub rename: bool,
    /// Compress the stored copy
    #[serde(default = "default_compress")]
    pub compress: Option<Compression>,
    /// Shape of the returned name
    #[serde(default)]
    pub path_style: PathStyle,
}

fn default_rename() -> bool {
    true
}

fn default_compress() -> Option<Compression> {
    Some(Compression::Gzip)
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            rename: default_rename(),
            compress: default_compress(),
            path_style: PathStyle::default(),
        }
    }
}

impl TransferOptions {
    /// Plain byte-for-byte copy under the original name.
    pub fn plain() -> Self {
        Self {
            rename: false,
            compress: None,
            path_style: PathStyle::Base,
        }
    }
}

/// Copy `filename` from `src_dir` into `dst_dir`, returning the stored name.
///
/// # Errors
/// * `StoreError::SourceNotFound` - the file is absent or not a regular file
/// * `StoreError::Io` - copy, compression or rename failed
pub fn transfer(
    filename: &str,
    src_dir: &Path,
    dst_dir: &Path,
    options: &TransferOptions,
) -> Result<String, StoreError> {
    let src_path = src_dir.join(filename);
    if !src_path.is_file() {
        return Err(StoreError::SourceNotFound(src_path));
    }

    let base_name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| StoreError::SourceNotFound(src_path.clone()))?;

    let temp = temp_path(dst_dir, &base_name);
    let sha = match copy_into(&src_path, &temp, options.compress) {
        Ok(sha) => sha,
        Err(e) => {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
    };

    let mut stored_name = if options.rename {
        format!("{}-{}", sha, base_name)
    } else {
        base_name
    };
    if let Some(compression) = options.compress {
        stored_name = format!("{}.{}", stored_name, compression.extension());
    }

    let final_path = dst_dir.join(&stored_name);
    let placed = is_up_to_date(&sha, &src_path, &final_path, options).and_then(|current| {
        if current {
            debug!(file = %stored_name, "transfer dedup hit");
            fs::remove_file(&temp)
        } else {
            fs::rename(&temp, &final_path)?;
            debug!(file = %stored_name, src = %src_path.display(), "transferred");
            Ok(())
        }
    });
    if let Err(e) = placed {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }

    returned_name(dst_dir, &stored_name, options.path_style)
}

/// Whether `final_path` already holds what a transfer would write.
///
/// `sha` is the digest of the source bytes just copied.
fn is_up_to_date(sha: &str, src_path: &Path, final_path: &Path, options: &TransferOptions) -> io::Result<bool> {
    if !final_path.is_file() {
        return Ok(false);
    }
    // Content-addressed names only ever hold the bytes they are named after
    if options.rename {
        return Ok(true);
    }
    if options.compress.is_some() {
        return Ok(false);
    }
    if fs::canonicalize(src_path)? == fs::canonicalize(final_path)? {
        return Ok(true);
    }
    Ok(digest_file(final_path)? == sha)
}

/// Reader adapter feeding every byte read through SHA-256.
struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Copy `src_path` into `temp`, returning the SHA-256 of the source bytes
/// that were written.
fn copy_into(src_path: &Path, temp: &Path, compression: Option<Compression>) -> io::Result<String> {
    let mut reader = HashingReader {
        inner: BufReader::new(File::open(src_path)?),
        hasher: Sha256::new(),
    };
    let out = File::create(temp)?;

    match compression {
        None => {
            let mut writer = BufWriter::new(out);
            io::copy(&mut reader, &mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Some(Compression::Gzip) => {
            let mut encoder = GzEncoder::new(BufWriter::new(out), flate2::Compression::default());
            io::copy(&mut reader, &mut encoder)?;
            let mut writer = encoder.finish()?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
    }

    Ok(hex::encode(reader.hasher.finalize()))
}

fn returned_name(dst_dir: &Path, stored_name: &str, style: PathStyle) -> Result<String, StoreError> {
    let name = match style {
        PathStyle::Base => stored_name.to_string(),
        PathStyle::Relative => dst_dir.join(stored_name).to_string_lossy().to_string(),
        PathStyle::Absolute => {
            let abs: PathBuf = fs::canonicalize(dst_dir)?.join(stored_name);
            abs.to_string_lossy().to_string()
        }
    };
    Ok(name)
}

/// Write a JSON sidecar named `<sha256(JCS(value))>-<stem>.json`.
///
/// Returns the sidecar's base name.
pub fn write_sidecar_json(value: &Value, stem: &str, dst_dir: &Path) -> Result<String, StoreError> {
    let name = format!("{}-{}.json", digest_serializable(value)?, stem);
    let content = serde_json::to_vec_pretty(value)?;
    atomic_write(dst_dir, &name, &content)?;
    Ok(name)
}
