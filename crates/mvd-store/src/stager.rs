//! Atomic staging of canonical entries.
//!
//! An ingestion writes into a private `.staging-<ulid>` directory under the
//! tasks root. Once the digest of its input description is known, the
//! staging directory is promoted to `<tasks_root>/<digest>` with a single
//! `rename`. If that entry already exists the staging directory is
//! discarded instead: first writer wins, and an entry is never merged into
//! or overwritten.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mvd_model::{TaskRecord, TASK_FILENAME};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::fsio::remove_dir_if_exists;
use crate::hasher::is_digest;

/// Name prefix of in-flight staging directories.
pub const STAGING_PREFIX: &str = ".staging-";

/// Name prefix of corrupt entries moved out of the canonical namespace.
pub const QUARANTINE_PREFIX: &str = ".quarantine-";

/// Outcome of [`AtomicStager::promote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    /// The staging directory became the canonical entry.
    Promoted(PathBuf),
    /// An entry for the digest already existed; the staging copy was discarded.
    AlreadyPresent(PathBuf),
}

impl Promotion {
    /// Canonical entry directory.
    pub fn path(&self) -> &Path {
        match self {
            Promotion::Promoted(p) | Promotion::AlreadyPresent(p) => p,
        }
    }

    /// Whether this call created the entry.
    pub fn is_promoted(&self) -> bool {
        matches!(self, Promotion::Promoted(_))
    }
}

/// Handle to a private staging directory.
///
/// Dropping an un-promoted handle deletes the directory.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    armed: bool,
}

impl StagingArea {
    /// Directory the parser writes into.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the staging tree now.
    pub fn discard(mut self) -> Result<(), StoreError> {
        self.armed = false;
        remove_dir_if_exists(&self.path)?;
        debug!(staging = %self.path.display(), "staging discarded");
        Ok(())
    }

    /// Give up ownership without cleanup, as an interrupted process would.
    pub fn leak(mut self) -> PathBuf {
        self.armed = false;
        self.path.clone()
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match remove_dir_if_exists(&self.path) {
            Ok(_) => debug!(staging = %self.path.display(), "staging cleaned up"),
            Err(e) => warn!(staging = %self.path.display(), error = %e, "failed to clean up staging"),
        }
    }
}

/// Stages and promotes canonical entries under one tasks root.
#[derive(Debug, Clone)]
pub struct AtomicStager {
    root: PathBuf,
}

impl AtomicStager {
    /// Create a stager rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Tasks root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical directory for a digest.
    pub fn entry_path(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    /// Path of the record file inside a canonical entry.
    pub fn record_path(&self, digest: &str) -> PathBuf {
        self.entry_path(digest).join(TASK_FILENAME)
    }

    /// Whether a canonical directory exists for `digest`.
    pub fn has_entry(&self, digest: &str) -> bool {
        is_digest(digest) && self.entry_path(digest).is_dir()
    }

    /// Load the record stored for `digest`.
    pub fn load_record(&self, digest: &str) -> Result<TaskRecord, StoreError> {
        if !is_digest(digest) {
            return Err(StoreError::InvalidDigest(digest.to_string()));
        }
        let json = fs::read_to_string(self.record_path(digest))?;
        Ok(TaskRecord::from_json(&json)?)
    }

    /// Raw bytes of the record file for `digest`, or `None` when it cannot
    /// be read.
    pub fn record_bytes(&self, digest: &str) -> Option<Vec<u8>> {
        if !is_digest(digest) {
            return None;
        }
        fs::read(self.record_path(digest)).ok()
    }

    /// Allocate a fresh staging directory.
    pub fn stage(&self) -> Result<StagingArea, StoreError> {
        let id = ulid::Ulid::new().to_string().to_lowercase();
        let path = self.root.join(format!("{}{}", STAGING_PREFIX, id));
        fs::create_dir(&path)?;
        debug!(staging = %path.display(), "staging allocated");
        Ok(StagingArea { path, armed: true })
    }

    /// Promote a completed staging directory to `<root>/<digest>`.
    ///
    /// Losing a race against a concurrent promotion of the same digest is
    /// reported as [`Promotion::AlreadyPresent`], not as an error.
    pub fn promote(&self, staging: StagingArea, digest: &str) -> Result<Promotion, StoreError> {
        if !is_digest(digest) {
            return Err(StoreError::InvalidDigest(digest.to_string()));
        }

        let final_dir = self.entry_path(digest);
        if final_dir.exists() {
            staging.discard()?;
            debug!(digest = %digest, "entry already present, staging discarded");
            return Ok(Promotion::AlreadyPresent(final_dir));
        }

        match fs::rename(staging.path(), &final_dir) {
            Ok(()) => {
                let _ = staging.leak();
                info!(digest = %digest, "entry promoted");
                Ok(Promotion::Promoted(final_dir))
            }
            Err(e) if final_dir.exists() => {
                debug!(digest = %digest, error = %e, "lost promotion race");
                staging.discard()?;
                Ok(Promotion::AlreadyPresent(final_dir))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Delete a staging directory.
    pub fn discard(&self, staging: StagingArea) -> Result<(), StoreError> {
        staging.discard()
    }

    /// Move a corrupt canonical entry out of the digest namespace.
    ///
    /// The entry is renamed to `.quarantine-<digest>-<ulid>` so that a fresh
    /// promotion can take its place; garbage collection removes it later.
    pub fn quarantine(&self, digest: &str) -> Result<PathBuf, StoreError> {
        if !is_digest(digest) {
            return Err(StoreError::InvalidDigest(digest.to_string()));
        }
        let id = ulid::Ulid::new().to_string().to_lowercase();
        let target = self
            .root
            .join(format!("{}{}-{}", QUARANTINE_PREFIX, digest, id));
        fs::rename(self.entry_path(digest), &target)?;
        warn!(digest = %digest, moved_to = %target.display(), "corrupt entry quarantined");
        Ok(target)
    }

    /// Quarantine the entry for `digest` only if its record still reads as
    /// `judged`, the bytes the caller found corrupt.
    ///
    /// Returns `Ok(None)` when the entry is gone or its record changed,
    /// i.e. another ingestion already replaced it.
    pub fn quarantine_if_unchanged(
        &self,
        digest: &str,
        judged: Option<&[u8]>,
    ) -> Result<Option<PathBuf>, StoreError> {
        if !self.has_entry(digest) {
            return Ok(None);
        }
        if self.record_bytes(digest).as_deref() != judged {
            debug!(digest = %digest, "entry changed since validation, left in place");
            return Ok(None);
        }
        match self.quarantine(digest) {
            Ok(path) => Ok(Some(path)),
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Digests of all canonical entries, sorted.
    pub fn list_entries(&self) -> Result<Vec<String>, StoreError> {
        let mut digests = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_digest(name) {
                    digests.push(name.to_string());
                }
            }
        }
        digests.sort();
        Ok(digests)
    }

    /// Staging directories currently present (in flight or orphaned).
    pub fn list_staging(&self) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(STAGING_PREFIX) && entry.file_type()?.is_dir() {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}
