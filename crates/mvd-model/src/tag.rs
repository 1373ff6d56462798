//! Cache tag: weak back-reference from a source directory to the digest
//! its last successful ingestion produced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag document stored as `tag.json` in an ingested source directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTag {
    /// Digest of the canonical entry produced by the last ingestion
    pub digest: String,
    /// Free-form extras (canonical path, format, source fingerprint, ...)
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl CacheTag {
    /// Extra key holding the absolute canonical entry path.
    pub const PATH_KEY: &'static str = "path";
    /// Extra key holding the format identifier.
    pub const FORMAT_KEY: &'static str = "format";
    /// Extra key holding the source directory fingerprint.
    pub const FINGERPRINT_KEY: &'static str = "fingerprint";
    /// Extra key holding the RFC 3339 write time.
    pub const WRITTEN_AT_KEY: &'static str = "written_at";

    /// Create a tag with no extras.
    pub fn new(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            extra: Map::new(),
        }
    }

    /// Add an extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Recorded source fingerprint, if any.
    pub fn fingerprint(&self) -> Option<&str> {
        self.extra.get(Self::FINGERPRINT_KEY).and_then(Value::as_str)
    }

    /// Recorded format identifier, if any.
    pub fn format(&self) -> Option<&str> {
        self.extra.get(Self::FORMAT_KEY).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_extras() {
        let tag = CacheTag::new("abc")
            .with_extra(CacheTag::FINGERPRINT_KEY, "f00")
            .with_extra(CacheTag::FORMAT_KEY, "vasp");
        assert_eq!(tag.fingerprint(), Some("f00"));
        assert_eq!(tag.format(), Some("vasp"));
    }

    #[test]
    fn test_missing_extra_defaults_to_empty() {
        let tag: CacheTag = serde_json::from_str(r#"{"digest":"abc"}"#).unwrap();
        assert!(tag.extra.is_empty());
        assert!(tag.fingerprint().is_none());
    }
}
