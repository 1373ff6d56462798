//! Input description: the hashing domain of a task.
//!
//! An input description holds only the physical inputs of a calculation
//! (parameters, composition, k-points, pseudopotential labels). Output
//! metadata such as timestamps, host names or run durations never belong
//! here, so that re-running or re-ingesting the same calculation from a
//! different location produces the same digest.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModelError;

/// Canonical sub-document used as the sole input to task hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputDescription(Value);

impl InputDescription {
    /// Wrap an already-built JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Build from any serializable structure.
    ///
    /// Fails with [`ModelError::InvalidInput`] when the value has no JSON
    /// representation (for example a map keyed by non-string values).
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, ModelError> {
        serde_json::to_value(value)
            .map(Self)
            .map_err(|e| ModelError::InvalidInput(e.to_string()))
    }

    /// Empty object description.
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Borrow the underlying value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into the underlying value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl Default for InputDescription {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for InputDescription {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_from_serializable_map() {
        let mut incar = BTreeMap::new();
        incar.insert("ENCUT", 500);
        let input = InputDescription::from_serializable(&incar).unwrap();
        assert_eq!(input.get("ENCUT"), Some(&json!(500)));
    }

    #[test]
    fn test_non_string_keys_rejected() {
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);
        let result = InputDescription::from_serializable(&bad);
        assert!(matches!(result, Err(ModelError::InvalidInput(_))));
    }

    #[test]
    fn test_transparent_serialization() {
        let input = InputDescription::new(json!({"code": "vasp"}));
        let text = serde_json::to_string(&input).unwrap();
        assert_eq!(text, r#"{"code":"vasp"}"#);
    }
}
