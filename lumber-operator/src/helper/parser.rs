//! The parser archetype: a transformer with a parse step.

use std::sync::Arc;

use lumber_entry::{Entry, Field, Value};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{BuildError, ProcessError, SubParserErrors};
use crate::helper::{TransformerConfig, TransformerOperator};
use crate::operator::Operator;
use crate::severity::{SeverityParser, SeverityParserConfig};
use crate::timestamp::{TimeParser, TimeParserConfig};

/// Configuration shared by parser operators.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Transformer fields (identity, downstream, failure policy).
    #[serde(flatten)]
    pub transformer: TransformerConfig,
    /// The field read by the parse function. Defaults to the record root.
    #[serde(default)]
    pub parse_from: Field,
    /// The field the parsed value is written to. Defaults to the record
    /// root.
    #[serde(default)]
    pub parse_to: Field,
    /// Keep the `parse_from` value instead of deleting it.
    #[serde(default)]
    pub preserve: bool,
    /// Optional time sub-parser, run after the parse step.
    #[serde(default, rename = "timestamp")]
    pub time: Option<TimeParserConfig>,
    /// Optional severity sub-parser, run after the parse step.
    #[serde(default, rename = "severity")]
    pub severity: Option<SeverityParserConfig>,
}

impl ParserConfig {
    /// The node's id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.transformer.id()
    }

    /// The node's type.
    #[must_use]
    pub fn operator_type(&self) -> &str {
        self.transformer.operator_type()
    }

    /// The declared downstream ids.
    #[must_use]
    pub fn output_ids(&self) -> Vec<String> {
        self.transformer.output_ids()
    }

    /// Move the node and its references into `namespace`.
    pub fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.transformer.set_namespace(namespace, exclusions);
    }

    /// Build the parser half of the runtime operator.
    pub fn build(&self) -> Result<ParserOperator, BuildError> {
        let transformer = self.transformer.build()?;
        let time = self
            .time
            .as_ref()
            .map(|config| config.build(transformer.id()))
            .transpose()?;
        let severity = self
            .severity
            .as_ref()
            .map(|config| config.build(transformer.id()))
            .transpose()?;
        Ok(ParserOperator {
            transformer,
            parse_from: self.parse_from.clone(),
            parse_to: self.parse_to.clone(),
            preserve: self.preserve,
            time,
            severity,
        })
    }
}

/// Runtime half shared by parser operators.
///
/// `process_with` reads `parse_from`, applies the concrete operator's
/// parse function, writes the result to `parse_to`, then runs the time
/// and severity sub-parsers. The sub-parsers are independent: a failure
/// in one does not stop the other, their successful writes stick, and
/// whatever failed is joined into a single error.
pub struct ParserOperator {
    transformer: TransformerOperator,
    parse_from: Field,
    parse_to: Field,
    preserve: bool,
    time: Option<TimeParser>,
    severity: Option<SeverityParser>,
}

impl ParserOperator {
    /// The operator's id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.transformer.id()
    }

    /// The operator's type.
    #[must_use]
    pub fn operator_type(&self) -> &str {
        self.transformer.operator_type()
    }

    /// The field read by the parse function.
    #[must_use]
    pub fn parse_from(&self) -> &Field {
        &self.parse_from
    }

    /// The resolved downstream operators.
    #[must_use]
    pub fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.transformer.outputs()
    }

    /// Resolve the downstream references.
    pub fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        self.transformer.set_outputs(outputs)
    }

    /// Run the parse step with `parse`, then forward the entry,
    /// honoring the transformer's failure policy.
    pub async fn process_with<F>(
        &self,
        ctx: &CancellationToken,
        mut entry: Entry,
        parse: F,
    ) -> Result<(), ProcessError>
    where
        F: FnOnce(&Value) -> Result<Value, ProcessError>,
    {
        match self.parse_into(&mut entry, parse) {
            Ok(()) => self.transformer.write(ctx, entry).await,
            Err(err) => self.transformer.handle_failure(ctx, entry, err).await,
        }
    }

    /// The parse step: read, parse, write, then run both sub-parsers.
    fn parse_into<F>(&self, entry: &mut Entry, parse: F) -> Result<(), ProcessError>
    where
        F: FnOnce(&Value) -> Result<Value, ProcessError>,
    {
        let value = entry
            .get(&self.parse_from)
            .ok_or_else(|| ProcessError::MissingField {
                field: self.parse_from.to_string(),
            })?;
        let parsed = parse(&value)?;
        if !self.preserve {
            entry.delete(&self.parse_from);
        }
        entry.set(&self.parse_to, parsed);

        let errors = SubParserErrors {
            time: self.time.as_ref().and_then(|p| p.parse(entry).err()),
            severity: self.severity.as_ref().and_then(|p| p.parse(entry).err()),
        };
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProcessError::SubParsers(errors))
        }
    }
}
