//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Config file (`--config`, else ~/.config/mvdkit/config.toml if present)
//! 3. Environment (`MVDKIT_REPOSITORY`)
//! 4. CLI flags
//!
//! Layers are merged as JSON values and then deserialized into
//! [`IngestConfig`], the explicit configuration object handed to the
//! ingestor.

mod defaults;
mod ingest;
mod merge;

pub use defaults::BuiltinDefaults;
pub use ingest::{
    default_config_path, ConfigError, IngestConfig, StagingConfig, TransferConfig,
    ValidationPolicy, ENV_REPOSITORY,
};
pub use merge::{deep_merge, merge_layers};
