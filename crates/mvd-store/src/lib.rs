//! Content-addressed task store
//!
//! Filesystem primitives behind the task ingestion cache:
//!
//! - [`hasher`]: RFC 8785 canonical JSON + SHA-256 digests of input descriptions
//! - [`transfer`]: deduplicating copy/compress of raw files into an entry
//! - [`stager`]: private staging directories promoted by atomic rename
//! - [`tag`]: cache tag files written back into source directories
//! - [`fingerprint`]: cheap source directory change detection
//! - [`gc`]: cleanup of staging directories orphaned by interrupted runs
//!
//! Layout under a tasks root:
//!
//! ```text
//! <tasks_root>/<sha256>/task.json            canonical entry
//! <tasks_root>/<sha256>/<sha256>-OUTCAR.gz    transferred raw file
//! <tasks_root>/.staging-<ulid>/               in-flight ingestion
//! <tasks_root>/.quarantine-<sha256>-<ulid>/   corrupt entry moved aside
//! ```

pub mod error;
pub mod fingerprint;
pub mod fsio;
pub mod gc;
pub mod hasher;
pub mod stager;
pub mod tag;
pub mod transfer;

pub use error::StoreError;
pub use fingerprint::source_fingerprint;
pub use gc::{collect_orphans, GcReport};
pub use hasher::{digest, digest_bytes, digest_file, digest_serializable, is_digest};
pub use stager::{AtomicStager, Promotion, StagingArea, QUARANTINE_PREFIX, STAGING_PREFIX};
pub use tag::{clear_tag, has_tag, read_tag, tag_path, write_tag};
pub use transfer::{transfer, write_sidecar_json, Compression, PathStyle, TransferOptions};
