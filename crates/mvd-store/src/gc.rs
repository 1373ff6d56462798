//! Garbage collection of abandoned staging and quarantine directories.
//!
//! An interrupted ingestion leaves its `.staging-<ulid>` directory behind.
//! Such directories are never visible as canonical entries, but they take
//! space; this module removes the ones that have not been touched for longer
//! than a threshold so that in-flight ingestions are left alone.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::fsio::{dir_size, remove_dir_if_exists};
use crate::stager::{QUARANTINE_PREFIX, STAGING_PREFIX};

/// Result of a garbage collection run.
#[derive(Debug, Clone, Default)]
pub struct GcReport {
    /// Number of staging/quarantine directories found
    pub scanned: usize,
    /// Directories removed (or that would be removed in dry-run mode)
    pub removed: Vec<PathBuf>,
    /// Directories younger than the threshold
    pub skipped: usize,
    /// Bytes reclaimed
    pub bytes_reclaimed: u64,
    /// Errors encountered (non-fatal)
    pub errors: Vec<String>,
}

/// Remove staging and quarantine directories older than `older_than`.
///
/// Canonical entries are never touched. With `dry_run` set, nothing is
/// deleted but the report lists what would have been.
pub fn collect_orphans(
    tasks_root: &Path,
    older_than: Duration,
    dry_run: bool,
) -> Result<GcReport, StoreError> {
    let mut report = GcReport::default();

    if !tasks_root.is_dir() {
        return Ok(report);
    }

    let now = SystemTime::now();
    let mut candidates = Vec::new();
    for entry in fs::read_dir(tasks_root)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with(STAGING_PREFIX) || name.starts_with(QUARANTINE_PREFIX)) {
            continue;
        }
        if !entry.file_type()?.is_dir() {
            continue;
        }
        candidates.push(entry.path());
    }
    candidates.sort();
    report.scanned = candidates.len();

    for path in candidates {
        let age = now
            .duration_since(last_modified(&path))
            .unwrap_or(Duration::ZERO);
        if age < older_than {
            debug!(path = %path.display(), age_secs = age.as_secs(), "orphan too young, skipping");
            report.skipped += 1;
            continue;
        }

        let size = dir_size(&path);
        if dry_run {
            info!(path = %path.display(), bytes = size, "dry-run: would remove");
        } else {
            if let Err(e) = remove_dir_if_exists(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove orphan");
                report.errors.push(format!("failed to remove {}: {}", path.display(), e));
                continue;
            }
            info!(path = %path.display(), bytes = size, "removed orphan");
        }
        report.bytes_reclaimed += size;
        report.removed.push(path);
    }

    Ok(report)
}

/// Most recent mtime of the directory or anything directly inside it.
fn last_modified(path: &Path) -> SystemTime {
    let mut latest = fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);

    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) {
                if mtime > latest {
                    latest = mtime;
                }
            }
        }
    }

    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::digest_bytes;
    use crate::stager::AtomicStager;
    use tempfile::TempDir;

    fn make_stager() -> (TempDir, AtomicStager) {
        let temp = TempDir::new().unwrap();
        let stager = AtomicStager::new(temp.path().join("tasks")).unwrap();
        (temp, stager)
    }

    #[test]
    fn test_removes_leaked_staging() {
        let (_t, stager) = make_stager();
        let leaked = stager.stage().unwrap().leak();
        fs::write(leaked.join("partial.json"), "12345").unwrap();

        let report = collect_orphans(stager.root(), Duration::ZERO, false).unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.removed, vec![leaked.clone()]);
        assert_eq!(report.bytes_reclaimed, 5);
        assert!(!leaked.exists());
    }

    #[test]
    fn test_keeps_canonical_entries() {
        let (_t, stager) = make_stager();
        let digest = digest_bytes(b"input");
        let staging = stager.stage().unwrap();
        fs::write(staging.path().join("task.json"), "{}").unwrap();
        stager.promote(staging, &digest).unwrap();

        let report = collect_orphans(stager.root(), Duration::ZERO, false).unwrap();

        assert_eq!(report.scanned, 0);
        assert!(stager.has_entry(&digest));
    }

    #[test]
    fn test_young_orphans_skipped() {
        let (_t, stager) = make_stager();
        let leaked = stager.stage().unwrap().leak();

        let report = collect_orphans(stager.root(), Duration::from_secs(3600), false).unwrap();

        assert_eq!(report.skipped, 1);
        assert!(report.removed.is_empty());
        assert!(leaked.exists());
    }

    #[test]
    fn test_dry_run_deletes_nothing() {
        let (_t, stager) = make_stager();
        let leaked = stager.stage().unwrap().leak();

        let report = collect_orphans(stager.root(), Duration::ZERO, true).unwrap();

        assert_eq!(report.removed, vec![leaked.clone()]);
        assert!(leaked.exists());
    }

    #[test]
    fn test_removes_quarantine() {
        let (_t, stager) = make_stager();
        let digest = digest_bytes(b"input");
        stager.promote(stager.stage().unwrap(), &digest).unwrap();
        let moved = stager.quarantine(&digest).unwrap();

        let report = collect_orphans(stager.root(), Duration::ZERO, false).unwrap();

        assert_eq!(report.removed, vec![moved.clone()]);
        assert!(!moved.exists());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let report = collect_orphans(&temp.path().join("nope"), Duration::ZERO, false).unwrap();
        assert_eq!(report.scanned, 0);
    }
}
