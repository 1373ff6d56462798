//! Format parsers
//!
//! A parser turns one calculation directory into a [`ParsedTask`], writing
//! any raw files it keeps into the staging directory it is handed. Parsers
//! never touch the canonical store or the cache tag; the ingestor owns both.

mod vasp;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mvd_model::InputDescription;
use mvd_store::{StoreError, TransferOptions};
use serde_json::{Map, Value};
use thiserror::Error;

pub use vasp::{VaspParser, DEFAULT_OUTPUTS as VASP_DEFAULT_OUTPUTS};

/// Result of parsing one directory.
#[derive(Debug, Clone)]
pub struct ParsedTask {
    /// Hashed identity of the calculation. Must be independent of the
    /// source location and of parse time.
    pub input: InputDescription,
    /// Output document (file references, summaries)
    pub output: Value,
    /// Opaque calculation label
    pub classification: String,
    /// Extras recorded in the task metadata, outside the hashed input
    pub extra: Map<String, Value>,
}

/// Per-call options passed through to parsers.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub tags: Vec<String>,
    pub label: String,
    pub description: String,
    /// How raw files are copied into the staging directory
    pub transfer: TransferOptions,
    /// Output files to keep; `None` selects the parser's default set
    pub outputs: Option<Vec<String>>,
    /// Skip the cache check and always re-parse
    pub force: bool,
}

/// Errors from a parser.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("required file missing: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("malformed {file}: {reason}")]
    Malformed { file: String, reason: String },

    #[error("file transfer failed: {0}")]
    Transfer(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParseError {
    pub fn malformed(file: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// Capability: parse one source directory of a given format.
pub trait TaskParser: Send + Sync {
    /// Format identifier, e.g. `"vasp"`.
    fn format(&self) -> &str;

    /// Parse `source_dir`, writing kept files into `staging_dir`.
    fn parse(
        &self,
        source_dir: &Path,
        staging_dir: &Path,
        options: &ParseOptions,
    ) -> Result<ParsedTask, ParseError>;
}

/// Format identifier → parser.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: BTreeMap<String, Arc<dyn TaskParser>>,
}

impl ParserRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in parsers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VaspParser::new()));
        registry
    }

    /// Register a parser under its format, replacing any previous one.
    pub fn register(&mut self, parser: Arc<dyn TaskParser>) -> Option<Arc<dyn TaskParser>> {
        self.parsers.insert(parser.format().to_string(), parser)
    }

    pub fn get(&self, format: &str) -> Option<Arc<dyn TaskParser>> {
        self.parsers.get(format).cloned()
    }

    /// Registered format identifiers, sorted.
    pub fn formats(&self) -> Vec<&str> {
        self.parsers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(&'static str);

    impl TaskParser for Fixed {
        fn format(&self) -> &str {
            self.0
        }

        fn parse(&self, _: &Path, _: &Path, _: &ParseOptions) -> Result<ParsedTask, ParseError> {
            Ok(ParsedTask {
                input: InputDescription::new(json!({"code": self.0})),
                output: Value::Null,
                classification: String::new(),
                extra: Map::new(),
            })
        }
    }

    #[test]
    fn test_builtin_has_vasp() {
        let registry = ParserRegistry::with_builtin();
        assert_eq!(registry.formats(), vec!["vasp"]);
        assert_eq!(registry.get("vasp").unwrap().format(), "vasp");
        assert!(registry.get("cp2k").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ParserRegistry::new();
        assert!(registry.register(Arc::new(Fixed("stub"))).is_none());
        assert!(registry.register(Arc::new(Fixed("stub"))).is_some());
        assert!(registry.register(Arc::new(Fixed("abinit"))).is_none());
        assert_eq!(registry.formats(), vec!["abinit", "stub"]);
    }

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert!(options.transfer.rename);
        assert!(options.outputs.is_none());
        assert!(!options.force);
    }
}
