//! File/JSON data references recorded for transferred outputs.

use serde::{Deserialize, Serialize};

/// Reference to a raw file and its JSON sidecar inside a canonical entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JFData {
    /// Data description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Compression suffix of the stored raw file (e.g. "gz"), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_fmt: Option<String>,
    /// Stored name of the raw file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Stored name of the JSON sidecar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_file_name: Option<String>,
}

impl JFData {
    /// Whether this entry references any stored file.
    pub fn is_present(&self) -> bool {
        self.file_name.is_some() || self.json_file_name.is_some()
    }
}
