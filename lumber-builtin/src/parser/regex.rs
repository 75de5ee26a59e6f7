//! Regex parser: named capture groups become a map.

use std::sync::Arc;

use async_trait::async_trait;
use lumber_entry::{Entry, Value};
use lumber_operator::config::{BuildContext, OperatorBuilder};
use lumber_operator::error::{BuildError, ProcessError};
use lumber_operator::helper::{ParserConfig, ParserOperator};
use lumber_operator::operator::Operator;
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Configuration of the `regex_parser` operator.
#[derive(Debug, Clone, Deserialize)]
pub struct RegexParserConfig {
    /// Parser archetype fields.
    #[serde(flatten)]
    pub parser: ParserConfig,
    /// The pattern; each named capture group becomes a map key.
    pub regex: String,
}

impl OperatorBuilder for RegexParserConfig {
    fn id(&self) -> &str {
        self.parser.id()
    }

    fn operator_type(&self) -> &str {
        self.parser.operator_type()
    }

    fn output_ids(&self) -> Vec<String> {
        self.parser.output_ids()
    }

    fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.parser.set_namespace(namespace, exclusions);
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, BuildError> {
        let regex = Regex::new(&self.regex).map_err(|err| BuildError::InvalidConfig {
            id: self.id().to_string(),
            message: format!("invalid `regex`: {err}"),
        })?;
        if regex.capture_names().flatten().next().is_none() {
            return Err(BuildError::InvalidConfig {
                id: self.id().to_string(),
                message: "`regex` must contain at least one named capture group".to_string(),
            });
        }
        Ok(Arc::new(RegexParser {
            parser: self.parser.build()?,
            regex,
        }))
    }
}

/// The `regex_parser` operator.
pub struct RegexParser {
    parser: ParserOperator,
    regex: Regex,
}

impl RegexParser {
    /// Match a string value and collect the named groups.
    fn parse_value(&self, value: &Value) -> Result<Value, ProcessError> {
        let raw = value.as_str().ok_or_else(|| ProcessError::ParseFailed {
            message: "value is not a string".to_string(),
        })?;
        let captures = self
            .regex
            .captures(raw)
            .ok_or_else(|| ProcessError::ParseFailed {
                message: "regex pattern does not match".to_string(),
            })?;

        let mut parsed = serde_json::Map::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(capture) = captures.name(name) {
                parsed.insert(
                    name.to_string(),
                    Value::String(capture.as_str().to_string()),
                );
            }
        }
        Ok(Value::Object(parsed))
    }
}

#[async_trait]
impl Operator for RegexParser {
    fn id(&self) -> &str {
        self.parser.id()
    }

    fn operator_type(&self) -> &str {
        self.parser.operator_type()
    }

    fn can_output(&self) -> bool {
        true
    }

    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.parser.outputs()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        self.parser.set_outputs(outputs)
    }

    fn can_process(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        self.parser
            .process_with(ctx, entry, |value| self.parse_value(value))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(regex: &str) -> Result<Arc<dyn Operator>, BuildError> {
        let config: RegexParserConfig = serde_yaml::from_str(&format!(
            r"
            id: my-regex
            type: regex_parser
            output: sink
            regex: '{regex}'
            "
        ))
        .expect("deserializes");
        config.build(&BuildContext::new())
    }

    #[test]
    fn requires_a_named_group() {
        assert!(build("(?P<level>\\w+) (?P<msg>.*)").is_ok());
        assert!(build("\\w+").is_err());
        assert!(build("(unclosed").is_err());
    }

    #[tokio::test]
    async fn extracts_named_groups() {
        let config: RegexParserConfig = serde_yaml::from_str(
            r"
            id: my-regex
            type: regex_parser
            regex: '^(?P<level>\w+): (?P<msg>.*)$'
            ",
        )
        .expect("deserializes");
        let regex = Regex::new(&config.regex).unwrap();
        let parser = RegexParser {
            parser: config.parser.build().unwrap(),
            regex,
        };
        let parsed = parser.parse_value(&json!("info: all good")).unwrap();
        assert_eq!(parsed, json!({"level": "info", "msg": "all good"}));

        let err = parser.parse_value(&json!("no separator")).unwrap_err();
        assert!(err.to_string().contains("match"));
    }
}
