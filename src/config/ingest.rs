//! Effective ingestion configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mvd_store::{Compression, TransferOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Environment variable overriding the repository root.
pub const ENV_REPOSITORY: &str = "MVDKIT_REPOSITORY";

/// How a cache tag is validated before it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Re-hash the stored record's input description only.
    Digest,
    /// Additionally require the source directory fingerprint to match.
    #[default]
    Fingerprint,
}

/// `[transfer]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    pub rename: bool,
    pub compress: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            rename: true,
            compress: true,
        }
    }
}

/// `[staging]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
    pub orphan_threshold_secs: u64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            orphan_threshold_secs: 3600,
        }
    }
}

/// Configuration handed to [`crate::TaskIngestor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Repository root; canonical entries live under `<repository>/tasks`
    pub repository: PathBuf,

    #[serde(default)]
    pub validation: ValidationPolicy,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub staging: StagingConfig,
}

impl IngestConfig {
    /// Defaults with an explicit repository root.
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            validation: ValidationPolicy::default(),
            transfer: TransferConfig::default(),
            staging: StagingConfig::default(),
        }
    }

    /// Set the validation policy.
    pub fn with_validation(mut self, policy: ValidationPolicy) -> Self {
        self.validation = policy;
        self
    }

    /// Root of the canonical store.
    pub fn tasks_root(&self) -> PathBuf {
        self.repository.join("tasks")
    }

    /// Default transfer options for parsers.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            rename: self.transfer.rename,
            compress: if self.transfer.compress {
                Some(Compression::Gzip)
            } else {
                None
            },
            ..TransferOptions::default()
        }
    }

    /// Age after which an orphaned staging directory may be collected.
    pub fn orphan_threshold(&self) -> Duration {
        Duration::from_secs(self.staging.orphan_threshold_secs)
    }

    /// Load the effective configuration from the process environment.
    ///
    /// `config_path` of `None` falls back to [`default_config_path`], which
    /// is skipped silently when absent. An explicit path must exist.
    pub fn load(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::IoError(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => default_config_path().filter(|p| p.exists()),
        };
        Self::build(file.as_deref(), env_overrides(|k| std::env::var(k).ok()), cli_overrides)
    }

    /// Build from explicit layers.
    pub fn build(
        config_file: Option<&Path>,
        env_overrides: Option<Value>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];

        if let Some(path) = config_file {
            layers.push(load_toml_file(path)?);
        }
        if let Some(env) = env_overrides {
            layers.push(env);
        }
        if let Some(cli) = cli_overrides {
            layers.push(cli);
        }

        let merged = merge_layers(layers);
        let config: IngestConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "repository must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `~/.config/mvdkit/config.toml`, if `HOME` is set.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config/mvdkit/config.toml"))
}

/// Environment layer, read through `lookup` so tests need not touch the
/// process environment.
fn env_overrides(lookup: impl Fn(&str) -> Option<String>) -> Option<Value> {
    let repository = lookup(ENV_REPOSITORY).filter(|v| !v.is_empty())?;
    Some(serde_json::json!({ "repository": repository }))
}

fn load_toml_file(path: &Path) -> Result<Value, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    let table: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
    Ok(toml_to_json(table))
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
