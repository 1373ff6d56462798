//! Task record persisted as `task.json` inside a canonical entry.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::input::InputDescription;
use crate::TASK_SCHEMA_ID;

/// Final state of a parsed calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// The calculation ran to completion.
    Successful,
    /// The calculation did not finish or did not converge.
    Failed,
    /// The parser could not tell.
    #[default]
    Unknown,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Successful => write!(f, "successful"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Provenance metadata. Never part of the hashed input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    /// Source directory this record was first ingested from
    pub dir_name: String,
    /// When the record was built
    pub created_at: DateTime<Utc>,
    /// Tool and version that built the record
    pub ingested_by: String,
    /// Free-form label
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Metadata tags for this task
    #[serde(default)]
    pub tags: Vec<String>,
    /// Parser-specific extras (run statistics, state, ...)
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Full parsed result of one calculation directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Schema identifier
    pub schema_id: String,
    /// Content digest of `input`; also the canonical directory name
    pub task_id: String,
    /// Format identifier of the parser that produced this record
    pub format: String,
    /// Opaque calculation label supplied by the parser
    pub classification: String,
    /// Hashed input sub-document
    pub input: InputDescription,
    /// Parser output document (file references, summaries)
    #[serde(default)]
    pub output: Value,
    /// Provenance metadata
    pub meta: TaskMeta,
}

impl TaskRecord {
    /// Assemble a record for a digest computed from `input`.
    pub fn new(
        task_id: String,
        format: String,
        classification: String,
        input: InputDescription,
        output: Value,
        meta: TaskMeta,
    ) -> Self {
        Self {
            schema_id: TASK_SCHEMA_ID.to_string(),
            task_id,
            format,
            classification,
            input,
            output,
            meta,
        }
    }

    /// Serialize to JSON (pretty printed)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from file
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }
}
