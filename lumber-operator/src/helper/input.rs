//! The input archetype: a producer with downstream outputs.

use std::sync::Arc;

use lumber_entry::Entry;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::BuildContext;
use crate::error::{BuildError, ProcessError};
use crate::helper::{BasicConfig, BasicOperator, WriterConfig, WriterOperator};
use crate::operator::Operator;

/// Configuration shared by input operators.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Identity fields.
    #[serde(flatten)]
    pub basic: BasicConfig,
    /// Downstream references.
    #[serde(flatten)]
    pub writer: WriterConfig,
}

impl InputConfig {
    /// The node's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.basic.id
    }

    /// The node's type.
    #[must_use]
    pub fn operator_type(&self) -> &str {
        &self.basic.operator_type
    }

    /// The declared downstream ids.
    #[must_use]
    pub fn output_ids(&self) -> Vec<String> {
        self.writer.output_ids()
    }

    /// Move the node and its references into `namespace`.
    pub fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.basic.set_namespace(namespace, exclusions);
        self.writer.set_namespace(namespace, exclusions);
    }

    /// Build the input half of the runtime operator.
    ///
    /// The input receives a child of the pipeline's root cancellation
    /// token; its producer tasks select against it.
    pub fn build(&self, context: &BuildContext) -> Result<InputOperator, BuildError> {
        Ok(InputOperator {
            basic: self.basic.build()?,
            writer: self.writer.build(),
            cancellation: context.cancellation.child_token(),
        })
    }
}

/// Runtime half shared by input operators: identity, fan-out, and the
/// producer's cancellation token.
pub struct InputOperator {
    basic: BasicOperator,
    writer: WriterOperator,
    cancellation: CancellationToken,
}

impl InputOperator {
    /// The operator's id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.basic.id()
    }

    /// The operator's type.
    #[must_use]
    pub fn operator_type(&self) -> &str {
        self.basic.operator_type()
    }

    /// The producer's cancellation token, a child of the pipeline root.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The resolved downstream operators.
    #[must_use]
    pub fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.writer.outputs()
    }

    /// Resolve the downstream references.
    pub fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        self.writer.set_outputs(self.id(), outputs)
    }

    /// Hand a produced entry to the downstream operators.
    pub async fn write(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        self.writer.write(ctx, entry).await
    }
}
