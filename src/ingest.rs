//! Task ingestion orchestrator.
//!
//! `START → CHECK_TAG → {CACHE_HIT | CACHE_MISS} → PARSE → HASH → PROMOTE →
//! WRITE_TAG → DONE`. A cache tag is only ever a hint: it is re-validated
//! against the canonical entry it names on every lookup, and any failure
//! falls back to a full parse.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use mvd_model::{CacheTag, TaskMeta, TaskRecord, INGESTED_BY, TASK_FILENAME};
use mvd_store::fsio::atomic_write;
use mvd_store::{
    collect_orphans, digest, is_digest, read_tag, source_fingerprint, write_tag, AtomicStager,
    GcReport, Promotion,
};
use tracing::{debug, info, warn};

use crate::config::{IngestConfig, ValidationPolicy};
use crate::error::{IngestError, IngestResult};
use crate::parser::{ParseOptions, ParserRegistry};

/// Why a cache tag was not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No tag file in the source directory
    NoTag,
    /// Tag file present but unreadable or not naming a digest
    UnreadableTag,
    /// Tag names a digest with no canonical entry
    EntryMissing,
    /// Canonical entry has no loadable record
    UnreadableRecord,
    /// Stored record does not hash to the tag digest
    DigestMismatch,
    /// Source directory changed since the tag was written
    SourceChanged,
    /// Entry was produced by a different format parser
    FormatMismatch,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MissReason::NoTag => "no_tag",
            MissReason::UnreadableTag => "unreadable_tag",
            MissReason::EntryMissing => "entry_missing",
            MissReason::UnreadableRecord => "unreadable_record",
            MissReason::DigestMismatch => "digest_mismatch",
            MissReason::SourceChanged => "source_changed",
            MissReason::FormatMismatch => "format_mismatch",
        };
        write!(f, "{}", s)
    }
}

/// Result of validating a source directory's cache tag.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Tag validated; the stored record
    Hit(TaskRecord),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Result of one `ingest` call.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Canonical identifier of the task
    pub digest: String,
    /// Calculation label from the parser
    pub classification: String,
    /// True when served from a validated cache tag without parsing
    pub cached: bool,
    /// Promotion result on the parse path
    pub promotion: Option<Promotion>,
    /// Canonical entry directory
    pub entry_dir: PathBuf,
}

/// Turns calculation directories into canonical, content-addressed task
/// entries.
///
/// Holds only immutable configuration, so one instance can be shared
/// across threads; concurrent ingestions coordinate through the
/// filesystem alone.
#[derive(Debug)]
pub struct TaskIngestor {
    config: IngestConfig,
    registry: ParserRegistry,
    stager: AtomicStager,
}

impl TaskIngestor {
    /// Create an ingestor, creating the tasks root if needed.
    pub fn new(config: IngestConfig, registry: ParserRegistry) -> IngestResult<Self> {
        let stager = AtomicStager::new(config.tasks_root())?;
        Ok(Self {
            config,
            registry,
            stager,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn stager(&self) -> &AtomicStager {
        &self.stager
    }

    /// Ingest `source_dir` with the parser registered for `format`.
    ///
    /// Returns the digest and classification of the canonical entry. A
    /// valid cache tag short-circuits parsing unless `options.force` is set.
    pub fn ingest(
        &self,
        source_dir: &Path,
        format: &str,
        options: &ParseOptions,
    ) -> IngestResult<IngestOutcome> {
        if !source_dir.is_dir() {
            return Err(IngestError::SourceNotFound(source_dir.to_path_buf()));
        }
        let parser = self
            .registry
            .get(format)
            .ok_or_else(|| IngestError::UnknownFormat(format.to_string()))?;
        let source_dir = fs::canonicalize(source_dir)?;
        debug!(source = %source_dir.display(), format = %format, "ingest start");

        if options.force {
            debug!(source = %source_dir.display(), "cache check skipped (force)");
        } else {
            match self.lookup(&source_dir) {
                CacheLookup::Hit(record) if record.format == format => {
                    info!(source = %source_dir.display(), digest = %record.task_id, "cache hit");
                    return Ok(IngestOutcome {
                        entry_dir: self.stager.entry_path(&record.task_id),
                        digest: record.task_id,
                        classification: record.classification,
                        cached: true,
                        promotion: None,
                    });
                }
                CacheLookup::Hit(record) => {
                    debug!(
                        source = %source_dir.display(),
                        reason = %MissReason::FormatMismatch,
                        stored = %record.format,
                        "cache miss"
                    );
                }
                CacheLookup::Miss(reason) => {
                    debug!(source = %source_dir.display(), reason = %reason, "cache miss");
                }
            }
        }

        // Taken before parsing so that edits made during the parse show up
        // as a changed source on the next lookup.
        let fingerprint = source_fingerprint(&source_dir)?;

        let staging = self.stager.stage()?;
        let parsed = match parser.parse(&source_dir, staging.path(), options) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(source = %source_dir.display(), format = %format, error = %e, "parse failed");
                if let Err(cleanup) = self.stager.discard(staging) {
                    warn!(error = %cleanup, "failed to discard staging after parse error");
                }
                return Err(IngestError::Parse {
                    format: format.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let task_id = digest(&parsed.input)?;
        debug!(digest = %task_id, "input hashed");

        let meta = TaskMeta {
            dir_name: source_dir.to_string_lossy().to_string(),
            created_at: Utc::now(),
            ingested_by: INGESTED_BY.to_string(),
            label: options.label.clone(),
            description: options.description.clone(),
            tags: options.tags.clone(),
            extra: parsed.extra,
        };
        let record = TaskRecord::new(
            task_id.clone(),
            format.to_string(),
            parsed.classification,
            parsed.input,
            parsed.output,
            meta,
        );
        atomic_write(staging.path(), TASK_FILENAME, record.to_json()?.as_bytes())?;

        self.quarantine_if_corrupt(&task_id)?;
        let promotion = self.stager.promote(staging, &task_id)?;

        let classification = match &promotion {
            Promotion::Promoted(_) => record.classification,
            Promotion::AlreadyPresent(_) => match self.stager.load_record(&task_id) {
                Ok(existing) => existing.classification,
                Err(_) => record.classification,
            },
        };
        let entry_dir = promotion.path().to_path_buf();

        let tag = CacheTag::new(task_id.clone())
            .with_extra(CacheTag::PATH_KEY, entry_dir.to_string_lossy().to_string())
            .with_extra(CacheTag::FORMAT_KEY, format)
            .with_extra(CacheTag::FINGERPRINT_KEY, fingerprint)
            .with_extra(CacheTag::WRITTEN_AT_KEY, Utc::now().to_rfc3339());
        write_tag(&source_dir, &tag)?;

        info!(
            source = %source_dir.display(),
            digest = %task_id,
            promoted = promotion.is_promoted(),
            "ingested"
        );

        Ok(IngestOutcome {
            digest: task_id,
            classification,
            cached: false,
            promotion: Some(promotion),
            entry_dir,
        })
    }

    /// Validate the cache tag of `source_dir` without parsing.
    pub fn lookup(&self, source_dir: &Path) -> CacheLookup {
        let tag = match read_tag(source_dir) {
            Ok(Some(tag)) => tag,
            Ok(None) => return CacheLookup::Miss(MissReason::NoTag),
            Err(e) => {
                debug!(source = %source_dir.display(), error = %e, "unreadable tag");
                return CacheLookup::Miss(MissReason::UnreadableTag);
            }
        };
        if !is_digest(&tag.digest) {
            return CacheLookup::Miss(MissReason::UnreadableTag);
        }
        if !self.stager.has_entry(&tag.digest) {
            return CacheLookup::Miss(MissReason::EntryMissing);
        }

        let record = match self.stager.load_record(&tag.digest) {
            Ok(record) => record,
            Err(e) => {
                debug!(digest = %tag.digest, error = %e, "unreadable record");
                return CacheLookup::Miss(MissReason::UnreadableRecord);
            }
        };
        if !self.record_matches(&record, &tag.digest) {
            return CacheLookup::Miss(MissReason::DigestMismatch);
        }

        if self.config.validation == ValidationPolicy::Fingerprint {
            let current = match source_fingerprint(source_dir) {
                Ok(fp) => fp,
                Err(_) => return CacheLookup::Miss(MissReason::SourceChanged),
            };
            if tag.fingerprint() != Some(current.as_str()) {
                return CacheLookup::Miss(MissReason::SourceChanged);
            }
        }

        CacheLookup::Hit(record)
    }

    /// Load the stored record for `digest`.
    pub fn load(&self, digest: &str) -> IngestResult<TaskRecord> {
        Ok(self.stager.load_record(digest)?)
    }

    /// Remove staging and quarantine directories older than `older_than`,
    /// or the configured threshold.
    pub fn collect_garbage(&self, older_than: Option<Duration>, dry_run: bool) -> IngestResult<GcReport> {
        let threshold = older_than.unwrap_or_else(|| self.config.orphan_threshold());
        Ok(collect_orphans(self.stager.root(), threshold, dry_run)?)
    }

    fn record_matches(&self, record: &TaskRecord, expected: &str) -> bool {
        record.task_id == expected
            && matches!(digest(&record.input), Ok(ref d) if d == expected)
    }

    /// Move an existing but corrupt entry for `digest` aside so that a
    /// fresh promotion can replace it. Valid entries are left alone, and so
    /// is an entry whose record changed after it was judged corrupt.
    fn quarantine_if_corrupt(&self, digest: &str) -> IngestResult<()> {
        if !self.stager.has_entry(digest) {
            return Ok(());
        }
        let judged = self.stager.record_bytes(digest);
        let valid = judged
            .as_deref()
            .and_then(|bytes| serde_json::from_slice::<TaskRecord>(bytes).ok())
            .map_or(false, |record| self.record_matches(&record, digest));
        if valid {
            return Ok(());
        }
        self.stager.quarantine_if_unchanged(digest, judged.as_deref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseError, ParsedTask, TaskParser};
    use mvd_model::InputDescription;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct EchoParser;

    impl TaskParser for EchoParser {
        fn format(&self) -> &str {
            "echo"
        }

        fn parse(&self, source: &Path, _staging: &Path, _: &ParseOptions) -> Result<ParsedTask, ParseError> {
            let text = fs::read_to_string(source.join("input.txt"))?;
            Ok(ParsedTask {
                input: InputDescription::new(json!({"text": text})),
                output: Value::Null,
                classification: "echo".to_string(),
                extra: Map::new(),
            })
        }
    }

    fn setup() -> (TempDir, TaskIngestor) {
        let temp = TempDir::new().unwrap();
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(EchoParser));
        let ingestor = TaskIngestor::new(IngestConfig::new(temp.path().join("repo")), registry).unwrap();
        (temp, ingestor)
    }

    fn source(temp: &TempDir, name: &str, text: &str) -> PathBuf {
        let dir = temp.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("input.txt"), text).unwrap();
        dir
    }

    #[test]
    fn test_ingestor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TaskIngestor>();
    }

    #[test]
    fn test_miss_then_hit() {
        let (temp, ingestor) = setup();
        let src = source(&temp, "a", "hello");

        assert_eq!(ingestor.lookup(&src), CacheLookup::Miss(MissReason::NoTag));
        let first = ingestor.ingest(&src, "echo", &ParseOptions::default()).unwrap();
        assert!(!first.cached);
        assert!(first.promotion.as_ref().unwrap().is_promoted());

        let second = ingestor.ingest(&src, "echo", &ParseOptions::default()).unwrap();
        assert!(second.cached);
        assert_eq!(second.digest, first.digest);
        assert_eq!(second.classification, "echo");
    }

    #[test]
    fn test_unknown_format() {
        let (temp, ingestor) = setup();
        let src = source(&temp, "a", "x");
        let err = ingestor.ingest(&src, "siesta", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::UnknownFormat(f) if f == "siesta"));
    }

    #[test]
    fn test_missing_source() {
        let (temp, ingestor) = setup();
        let err = ingestor
            .ingest(&temp.path().join("nope"), "echo", &ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound(_)));
    }

    #[test]
    fn test_tampered_record_is_digest_mismatch() {
        let (temp, ingestor) = setup();
        let src = source(&temp, "a", "hello");
        let outcome = ingestor.ingest(&src, "echo", &ParseOptions::default()).unwrap();

        let mut record = ingestor.load(&outcome.digest).unwrap();
        record.input = InputDescription::new(json!({"text": "edited"}));
        fs::write(outcome.entry_dir.join(TASK_FILENAME), record.to_json().unwrap()).unwrap();

        assert_eq!(ingestor.lookup(&src), CacheLookup::Miss(MissReason::DigestMismatch));
    }

    #[test]
    fn test_corrupt_entry_quarantined_on_reingest() {
        let (temp, ingestor) = setup();
        let src = source(&temp, "a", "hello");
        let outcome = ingestor.ingest(&src, "echo", &ParseOptions::default()).unwrap();
        fs::write(outcome.entry_dir.join(TASK_FILENAME), "{ truncated").unwrap();

        assert_eq!(ingestor.lookup(&src), CacheLookup::Miss(MissReason::UnreadableRecord));
        let again = ingestor.ingest(&src, "echo", &ParseOptions::default()).unwrap();

        assert_eq!(again.digest, outcome.digest);
        assert!(again.promotion.unwrap().is_promoted());
        assert!(ingestor.lookup(&src).is_hit());
        assert!(ingestor.load(&outcome.digest).is_ok());
    }

    #[test]
    fn test_force_reparses() {
        let (temp, ingestor) = setup();
        let src = source(&temp, "a", "hello");
        ingestor.ingest(&src, "echo", &ParseOptions::default()).unwrap();

        let options = ParseOptions {
            force: true,
            ..ParseOptions::default()
        };
        let forced = ingestor.ingest(&src, "echo", &options).unwrap();

        assert!(!forced.cached);
        assert!(matches!(forced.promotion, Some(Promotion::AlreadyPresent(_))));
    }

    #[test]
    fn test_tag_extras() {
        let (temp, ingestor) = setup();
        let src = source(&temp, "a", "hello");
        let outcome = ingestor.ingest(&src, "echo", &ParseOptions::default()).unwrap();

        let tag = read_tag(&src).unwrap().unwrap();
        assert_eq!(tag.digest, outcome.digest);
        assert_eq!(tag.format(), Some("echo"));
        assert_eq!(tag.fingerprint(), Some(source_fingerprint(&src).unwrap().as_str()));
        assert_eq!(tag.extra[CacheTag::PATH_KEY], outcome.entry_dir.to_str().unwrap());
    }

    #[test]
    fn test_digest_policy_ignores_source_edits() {
        let temp = TempDir::new().unwrap();
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(EchoParser));
        let config = IngestConfig::new(temp.path().join("repo")).with_validation(ValidationPolicy::Digest);
        let ingestor = TaskIngestor::new(config, registry).unwrap();
        let src = source(&temp, "a", "hello");
        ingestor.ingest(&src, "echo", &ParseOptions::default()).unwrap();

        fs::write(src.join("notes.txt"), "unrelated").unwrap();

        assert!(ingestor.lookup(&src).is_hit());
    }

    #[test]
    fn test_meta_recorded() {
        let (temp, ingestor) = setup();
        let src = source(&temp, "a", "hello");
        let options = ParseOptions {
            tags: vec!["relax".to_string()],
            label: "fe2o3".to_string(),
            ..ParseOptions::default()
        };
        let outcome = ingestor.ingest(&src, "echo", &options).unwrap();

        let record = ingestor.load(&outcome.digest).unwrap();
        assert_eq!(record.meta.tags, vec!["relax"]);
        assert_eq!(record.meta.label, "fe2o3");
        assert_eq!(record.meta.ingested_by, INGESTED_BY);
        assert_eq!(record.format, "echo");
    }
}
