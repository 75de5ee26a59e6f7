//! The in-flight log record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Field, Severity, Value};

/// One log record flowing through the pipeline.
///
/// Created by input operators, mutated by transformers, and consumed by
/// outputs. An entry is owned by exactly one operator at a time; ownership
/// transfers on `process` and ends when the entry is flushed or dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// When the event the entry describes occurred.
    pub timestamp: DateTime<Utc>,
    /// The entry's severity.
    #[serde(default)]
    pub severity: Severity,
    /// The log body. Scalar, ordered map, or sequence.
    pub record: Value,
    /// Attributes of the entity that produced the entry.
    #[serde(default)]
    pub resource: HashMap<String, String>,
    /// Attributes attached during processing.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Entry {
    /// Create an empty entry stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            severity: Severity::Default,
            record: Value::Null,
            resource: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    /// Create an entry with the given record, stamped with the current time.
    #[must_use]
    pub fn from_record(record: impl Into<Value>) -> Self {
        let mut entry = Self::new();
        entry.record = record.into();
        entry
    }

    /// Read the value at `field`. Returns `None` when any path component
    /// is missing. Never mutates the entry.
    #[must_use]
    pub fn get(&self, field: &Field) -> Option<Value> {
        field.get(self)
    }

    /// Write `value` at `field`, creating intermediate maps as needed.
    pub fn set(&mut self, field: &Field, value: impl Into<Value>) {
        field.set(self, value.into());
    }

    /// Remove the value at `field`, returning it if it was present.
    pub fn delete(&mut self, field: &Field) -> Option<Value> {
        field.delete(self)
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_entry_is_empty() {
        let entry = Entry::new();
        assert_eq!(entry.severity, Severity::Default);
        assert_eq!(entry.record, Value::Null);
        assert!(entry.resource.is_empty());
        assert!(entry.labels.is_empty());
    }

    #[test]
    fn from_record_sets_record() {
        let entry = Entry::from_record(json!({"message": "hello"}));
        assert_eq!(entry.record["message"], json!("hello"));
    }

    #[test]
    fn serde_round_trip() {
        let mut entry = Entry::from_record(json!({"a": 1}));
        entry.labels.insert("env".into(), "prod".into());
        let text = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&text).unwrap();
        assert_eq!(entry, back);
    }
}
