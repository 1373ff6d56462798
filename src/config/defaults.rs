//! Built-in defaults (layer 1)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Repository root (default: ~/.repository)
    pub repository: PathBuf,

    /// Cache-hit validation policy (default: "fingerprint")
    pub validation: String,

    /// Store transferred files under content-digest names (default: true)
    pub transfer_rename: bool,

    /// Gzip transferred files (default: true)
    pub transfer_compress: bool,

    /// Minimum age before an orphaned staging directory is collected
    /// (default: 3600 = 1 hour)
    pub orphan_threshold_secs: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            validation: "fingerprint".to_string(),
            transfer_rename: true,
            transfer_compress: true,
            orphan_threshold_secs: 3600,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "repository": self.repository,
            "validation": self.validation,
            "transfer": {
                "rename": self.transfer_rename,
                "compress": self.transfer_compress
            },
            "staging": {
                "orphan_threshold_secs": self.orphan_threshold_secs
            }
        })
    }
}

/// `~/.repository`, or `.repository` relative to the working directory when
/// `HOME` is unset.
fn default_repository() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".repository"),
        Err(_) => PathBuf::from(".repository"),
    }
}
