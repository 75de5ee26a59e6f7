//! Raw declarative nodes: ordered maps of config values.

use lumber_operator::error::BuildError;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;

/// One raw node of the pipeline configuration.
///
/// A params map holds `id`, `type`, optional `output`/`outputs`, and
/// whatever type-specific fields the operator's config defines. It stays
/// untyped until the registry deserializes it into a concrete builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(pub Mapping);

impl Params {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(&Value::from(key)).and_then(Value::as_str)
    }

    /// The node's `id`, or empty when absent.
    #[must_use]
    pub fn id(&self) -> &str {
        self.get_str("id").unwrap_or_default()
    }

    /// The node's `type`, or empty when absent.
    #[must_use]
    pub fn operator_type(&self) -> &str {
        self.get_str("type").unwrap_or_default()
    }

    /// The declared downstream references: `output` then `outputs`.
    #[must_use]
    pub fn output_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        if let Some(output) = self.get_str("output") {
            ids.push(output.to_string());
        }
        if let Some(Value::Sequence(outputs)) = self.0.get(&Value::from("outputs")) {
            for output in outputs {
                if let Some(output) = output.as_str() {
                    ids.push(output.to_string());
                }
            }
        }
        ids
    }

    /// A type-specific field, for template parameter lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(&Value::from(key))
    }

    /// Check the fields every node must carry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id().is_empty() {
            return Err(ConfigError::Build(BuildError::InvalidConfig {
                id: self.operator_type().to_string(),
                message: "missing required `id` field".to_string(),
            }));
        }
        if self.operator_type().is_empty() {
            return Err(ConfigError::Build(BuildError::InvalidConfig {
                id: self.id().to_string(),
                message: "missing required `type` field".to_string(),
            }));
        }
        Ok(())
    }

    /// Rewrite every downstream reference through `rewrite`.
    pub fn rewrite_outputs(&mut self, mut rewrite: impl FnMut(&str) -> String) {
        if let Some(Value::String(output)) = self.0.get_mut(&Value::from("output")) {
            *output = rewrite(output);
        }
        if let Some(Value::Sequence(outputs)) = self.0.get_mut(&Value::from("outputs")) {
            for output in outputs {
                if let Value::String(output) = output {
                    *output = rewrite(output);
                }
            }
        }
    }

    /// The node as a YAML value, for registry deserialization.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Mapping(self.0.clone())
    }
}

/// The ordered list of raw nodes a pipeline is declared as.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(pub Vec<Params>);

#[cfg(test)]
mod tests {
    use super::*;

    fn params(yaml: &str) -> Params {
        serde_yaml::from_str(yaml).expect("valid yaml")
    }

    #[test]
    fn accessors_read_the_map() {
        let node = params("{id: a, type: noop, output: b, port: 9000}");
        assert_eq!(node.id(), "a");
        assert_eq!(node.operator_type(), "noop");
        assert_eq!(node.output_ids(), vec!["b".to_string()]);
        assert_eq!(node.get("port"), Some(&Value::from(9000)));
    }

    #[test]
    fn output_and_outputs_concatenate() {
        let node = params("{id: a, type: noop, output: b, outputs: [c, d]}");
        assert_eq!(node.output_ids(), vec!["b", "c", "d"]);
    }

    #[test]
    fn validation_requires_id_and_type() {
        assert!(params("{id: a, type: noop}").validate().is_ok());
        let err = params("{type: noop}").validate().unwrap_err();
        assert!(err.to_string().contains("id"));
        let err = params("{id: a}").validate().unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn rewrite_touches_all_references() {
        let mut node = params("{id: a, type: noop, output: output, outputs: [x]}");
        node.rewrite_outputs(|r| {
            if r == "output" {
                "sink".to_string()
            } else {
                r.to_string()
            }
        });
        assert_eq!(node.output_ids(), vec!["sink", "x"]);
    }
}
