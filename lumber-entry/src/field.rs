//! Field addressing — a path language into an entry.
//!
//! A field is rooted at one of the entry's top-level attributes:
//!
//! - `record.foo.bar` (or the shorthand `foo.bar`) addresses into the
//!   record body, traversing ordered maps by key and sequences by numeric
//!   component;
//! - `resource.k` and `labels.k` address one key of the flat string maps;
//! - `timestamp` and `severity` address the top-level attributes.
//!
//! A literal dot inside a key is escaped as `\.`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Entry, Severity, Value};

/// An addressable path into an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    /// A path into the record body. An empty path is the record root.
    Record(Vec<String>),
    /// One key of the resource map.
    Resource(String),
    /// One key of the labels map.
    Label(String),
    /// The top-level timestamp.
    Timestamp,
    /// The top-level severity.
    Severity,
}

/// A field string that could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    /// `resource.` and `labels.` fields address exactly one key.
    #[error("field `{0}` must address exactly one {1} key")]
    FlatMapDepth(String, &'static str),
    /// `timestamp` and `severity` take no sub-path.
    #[error("field `{0}` does not address into `{1}`")]
    NoSubPath(String, &'static str),
}

impl Field {
    /// The record root — the whole record body.
    #[must_use]
    pub fn record_root() -> Self {
        Field::Record(Vec::new())
    }

    /// A record field from pre-split path components.
    #[must_use]
    pub fn record<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Field::Record(keys.into_iter().map(Into::into).collect())
    }

    /// Read the value this field addresses. `None` when any path component
    /// is missing. Never mutates the entry.
    #[must_use]
    pub fn get(&self, entry: &Entry) -> Option<Value> {
        match self {
            Field::Record(keys) => {
                let mut current = &entry.record;
                for key in keys {
                    current = descend(current, key)?;
                }
                Some(current.clone())
            }
            Field::Resource(key) => entry.resource.get(key).cloned().map(Value::String),
            Field::Label(key) => entry.labels.get(key).cloned().map(Value::String),
            Field::Timestamp => Some(Value::String(entry.timestamp.to_rfc3339())),
            Field::Severity => Some(Value::String(entry.severity.to_string())),
        }
    }

    /// Write `value` at this field, creating intermediate maps as needed.
    ///
    /// Writing a non-string into `resource`/`labels` stores its JSON text.
    /// Writing an unparseable value into `timestamp`/`severity` leaves the
    /// attribute unchanged.
    pub fn set(&self, entry: &mut Entry, value: Value) {
        match self {
            Field::Record(keys) => {
                let mut current = &mut entry.record;
                for key in keys {
                    current = descend_or_create(current, key);
                }
                *current = value;
            }
            Field::Resource(key) => {
                entry.resource.insert(key.clone(), stringify(value));
            }
            Field::Label(key) => {
                entry.labels.insert(key.clone(), stringify(value));
            }
            Field::Timestamp => {
                if let Some(ts) = value_to_timestamp(&value) {
                    entry.timestamp = ts;
                }
            }
            Field::Severity => {
                if let Some(sev) = value_to_severity(&value) {
                    entry.severity = sev;
                }
            }
        }
    }

    /// Remove the value at this field, returning it if it was present.
    ///
    /// Deleting a key from a map removes the key; deleting a sequence
    /// element removes it and compacts the sequence. Deleting `timestamp`
    /// or `severity` resets the attribute to its default.
    pub fn delete(&self, entry: &mut Entry) -> Option<Value> {
        match self {
            Field::Record(keys) => match keys.split_last() {
                None => Some(std::mem::replace(&mut entry.record, Value::Null)),
                Some((last, parents)) => {
                    let mut current = &mut entry.record;
                    for key in parents {
                        current = descend_mut(current, key)?;
                    }
                    remove(current, last)
                }
            },
            Field::Resource(key) => entry.resource.remove(key).map(Value::String),
            Field::Label(key) => entry.labels.remove(key).map(Value::String),
            Field::Timestamp => {
                let old = entry.timestamp.to_rfc3339();
                entry.timestamp = DateTime::<Utc>::MIN_UTC;
                Some(Value::String(old))
            }
            Field::Severity => {
                let old = entry.severity.to_string();
                entry.severity = Severity::Default;
                Some(Value::String(old))
            }
        }
    }
}

/// Immutable descent by one component: maps by key, sequences by index.
fn descend<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(seq) => seq.get(key.parse::<usize>().ok()?),
        _ => None,
    }
}

/// Mutable descent by one component.
fn descend_mut<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(key),
        Value::Array(seq) => {
            let index = key.parse::<usize>().ok()?;
            seq.get_mut(index)
        }
        _ => None,
    }
}

/// Descend by one component for a write, creating what is missing.
///
/// An in-range numeric component descends into an existing sequence;
/// anything else is coerced to a map keyed by the component string, so a
/// read with the same path always finds the written value.
fn descend_or_create<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    let in_range_index = match value {
        Value::Array(seq) => key
            .parse::<usize>()
            .ok()
            .filter(|index| *index <= seq.len()),
        _ => None,
    };

    if let Some(index) = in_range_index {
        let Value::Array(seq) = value else {
            unreachable!()
        };
        if index == seq.len() {
            seq.push(Value::Null);
        }
        return &mut seq[index];
    }

    if !matches!(value, Value::Object(_)) {
        *value = Value::Object(serde_json::Map::new());
    }
    let Value::Object(map) = value else {
        unreachable!()
    };
    map.entry(key.to_string()).or_insert(Value::Null)
}

/// Remove the final component from its container.
fn remove(value: &mut Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.shift_remove(key),
        Value::Array(seq) => {
            let index = key.parse::<usize>().ok()?;
            if index < seq.len() {
                Some(seq.remove(index))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn value_to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => DateTime::from_timestamp(n.as_i64()?, 0),
        _ => None,
    }
}

fn value_to_severity(value: &Value) -> Option<Severity> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => Severity::from_value(n.as_i64()?),
        _ => None,
    }
}

/// Split a field string on unescaped dots and unescape the components.
fn split_components(s: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('.') => current.push('.'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            '.' => {
                components.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    components.push(current);
    components
}

fn escape_component(component: &str) -> String {
    component.replace('.', "\\.")
}

impl FromStr for Field {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Field::record_root());
        }
        let components = split_components(s);
        let Some((root, rest)) = components.split_first() else {
            return Ok(Field::record_root());
        };
        match root.as_str() {
            "record" => Ok(Field::Record(rest.to_vec())),
            "resource" => match rest {
                [key] => Ok(Field::Resource(key.clone())),
                _ => Err(FieldError::FlatMapDepth(s.to_string(), "resource")),
            },
            "labels" => match rest {
                [key] => Ok(Field::Label(key.clone())),
                _ => Err(FieldError::FlatMapDepth(s.to_string(), "label")),
            },
            "timestamp" if rest.is_empty() => Ok(Field::Timestamp),
            "timestamp" => Err(FieldError::NoSubPath(s.to_string(), "timestamp")),
            "severity" if rest.is_empty() => Ok(Field::Severity),
            "severity" => Err(FieldError::NoSubPath(s.to_string(), "severity")),
            _ => Ok(Field::Record(components)),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Record(keys) if keys.is_empty() => f.write_str("record"),
            Field::Record(keys) => {
                let path: Vec<String> = keys.iter().map(|k| escape_component(k)).collect();
                write!(f, "record.{}", path.join("."))
            }
            Field::Resource(key) => write!(f, "resource.{}", escape_component(key)),
            Field::Label(key) => write!(f, "labels.{}", escape_component(key)),
            Field::Timestamp => f.write_str("timestamp"),
            Field::Severity => f.write_str("severity"),
        }
    }
}

impl Default for Field {
    /// The record root.
    fn default() -> Self {
        Field::record_root()
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(s: &str) -> Field {
        s.parse().unwrap()
    }

    #[test]
    fn parses_both_syntaxes() {
        assert_eq!(field("record.foo.bar"), Field::record(["foo", "bar"]));
        assert_eq!(field("foo.bar"), Field::record(["foo", "bar"]));
        assert_eq!(field("record"), Field::record_root());
        assert_eq!(field("resource.host"), Field::Resource("host".into()));
        assert_eq!(field("labels.env"), Field::Label("env".into()));
        assert_eq!(field("timestamp"), Field::Timestamp);
        assert_eq!(field("severity"), Field::Severity);
    }

    #[test]
    fn escaped_dot_stays_in_key() {
        assert_eq!(field("foo\\.bar"), Field::record(["foo.bar"]));
        assert_eq!(field("foo\\.bar").to_string(), "record.foo\\.bar");
    }

    #[test]
    fn resource_depth_is_one() {
        assert!("resource.a.b".parse::<Field>().is_err());
        assert!("resource".parse::<Field>().is_err());
        assert!("timestamp.x".parse::<Field>().is_err());
    }

    #[test]
    fn get_after_set_returns_value() {
        let mut entry = Entry::new();
        let f = field("foo.bar");
        f.set(&mut entry, json!("baz"));
        assert_eq!(f.get(&entry), Some(json!("baz")));
        assert_eq!(entry.record, json!({"foo": {"bar": "baz"}}));
    }

    #[test]
    fn get_missing_prefix_does_not_mutate() {
        let entry = Entry::from_record(json!({"a": 1}));
        let before = entry.clone();
        assert_eq!(field("a.b.c").get(&entry), None);
        assert_eq!(entry, before);
    }

    #[test]
    fn delete_then_get_is_absent() {
        let mut entry = Entry::from_record(json!({"a": {"b": 2}, "keep": true}));
        let f = field("a.b");
        assert_eq!(f.delete(&mut entry), Some(json!(2)));
        assert_eq!(f.get(&entry), None);
        assert_eq!(field("keep").get(&entry), Some(json!(true)));
    }

    #[test]
    fn numeric_components_index_sequences() {
        let entry = Entry::from_record(json!({"seq": ["a", {"x": "y"}]}));
        assert_eq!(field("seq.1.x").get(&entry), Some(json!("y")));
        assert_eq!(field("seq.5").get(&entry), None);
    }

    #[test]
    fn delete_sequence_element_compacts() {
        let mut entry = Entry::from_record(json!({"seq": [1, 2, 3]}));
        assert_eq!(field("seq.1").delete(&mut entry), Some(json!(2)));
        assert_eq!(entry.record, json!({"seq": [1, 3]}));
    }

    #[test]
    fn set_into_sequence_assigns_in_range() {
        let mut entry = Entry::from_record(json!({"seq": [1, 2]}));
        field("seq.0").set(&mut entry, json!(9));
        assert_eq!(entry.record, json!({"seq": [9, 2]}));
        field("seq.2").set(&mut entry, json!(7));
        assert_eq!(entry.record, json!({"seq": [9, 2, 7]}));
    }

    #[test]
    fn resource_and_labels_round_trip() {
        let mut entry = Entry::new();
        let f = field("labels.env");
        f.set(&mut entry, json!("prod"));
        assert_eq!(f.get(&entry), Some(json!("prod")));
        assert_eq!(f.delete(&mut entry), Some(json!("prod")));
        assert_eq!(f.get(&entry), None);
    }

    #[test]
    fn record_root_set_replaces_body() {
        let mut entry = Entry::from_record(json!({"a": 1}));
        Field::record_root().set(&mut entry, json!("flat"));
        assert_eq!(entry.record, json!("flat"));
    }

    #[test]
    fn serde_uses_string_form() {
        let f: Field = serde_yaml::from_str("labels.env").unwrap();
        assert_eq!(f, Field::Label("env".into()));
        let text = serde_json::to_string(&field("a.b")).unwrap();
        assert_eq!(text, "\"record.a.b\"");
    }
}
