//! Matvird task ingestion cache
//!
//! Turns a calculation output directory into a canonical, deduplicated,
//! content-addressed task entry, and skips the parse on re-submission when
//! the source directory's cache tag still validates.
//!
//! ```text
//! source dir ──► TaskIngestor ──► parser (staging) ──► digest ──► promote ──► tag
//!                    │                                                ▲
//!                    └──────────── valid tag: stored record ──────────┘
//! ```
//!
//! Store primitives live in `mvd-store`, shared documents in `mvd-model`.

pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod parser;

pub use config::{ConfigError, IngestConfig, ValidationPolicy};
pub use error::{IngestError, IngestResult};
pub use ingest::{CacheLookup, IngestOutcome, MissReason, TaskIngestor};
pub use parser::{ParseError, ParseOptions, ParsedTask, ParserRegistry, TaskParser, VaspParser};

pub use mvd_model as model;
pub use mvd_store as store;
