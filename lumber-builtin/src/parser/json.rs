//! JSON parser: parses a string field as a JSON value.

use std::sync::Arc;

use async_trait::async_trait;
use lumber_entry::{Entry, Value};
use lumber_operator::config::{BuildContext, OperatorBuilder};
use lumber_operator::error::{BuildError, ProcessError};
use lumber_operator::helper::{ParserConfig, ParserOperator};
use lumber_operator::operator::Operator;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Configuration of the `json_parser` operator.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonParserConfig {
    /// Parser archetype fields.
    #[serde(flatten)]
    pub parser: ParserConfig,
}

impl OperatorBuilder for JsonParserConfig {
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
        Ok(Arc::new(JsonParser {
            parser: self.parser.build()?,
        }))
    }
}

/// The `json_parser` operator.
pub struct JsonParser {
    parser: ParserOperator,
}

/// Parse a string value as JSON.
fn parse_json(value: &Value) -> Result<Value, ProcessError> {
    let raw = value.as_str().ok_or_else(|| ProcessError::ParseFailed {
        message: "value is not a string".to_string(),
    })?;
    serde_json::from_str(raw).map_err(|err| ProcessError::ParseFailed {
        message: err.to_string(),
    })
}

#[async_trait]
impl Operator for JsonParser {
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
        self.parser.process_with(ctx, entry, parse_json).await
    }
}
