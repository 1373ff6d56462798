//! Matvird task document model
//!
//! Shared, serde-serializable documents produced and consumed by the task
//! ingestion cache: the hashed input description, the full task record
//! persisted as `task.json`, the cache tag written back into source
//! directories, and the calculation classification labels.

pub mod calc_type;
pub mod data;
pub mod error;
pub mod input;
pub mod tag;
pub mod task;

pub use calc_type::{calc_type, run_type, task_type, CalcType, RunType, TaskType};
pub use data::JFData;
pub use error::ModelError;
pub use input::InputDescription;
pub use tag::CacheTag;
pub use task::{TaskMeta, TaskRecord, TaskState};

/// Name of the record file inside every canonical entry.
pub const TASK_FILENAME: &str = "task.json";

/// Name of the tag file written into ingested source directories.
pub const TAG_FILENAME: &str = "tag.json";

/// Schema identifier for task.json
pub const TASK_SCHEMA_ID: &str = "matvird/task@1";

/// Tool identifier recorded in task metadata.
pub const INGESTED_BY: &str = concat!("matvird-ingest/", env!("CARGO_PKG_VERSION"));
