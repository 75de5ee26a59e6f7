//! The transformer archetype: synchronous mutate-and-forward.

use std::sync::Arc;

use lumber_entry::Entry;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{BuildError, ProcessError};
use crate::helper::{BasicConfig, BasicOperator, WriterConfig, WriterOperator};
use crate::operator::Operator;

/// What to do with an entry whose transformation failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Return the error to the caller and do not forward the entry.
    Drop,
    /// Forward the entry as-is and log the failure at warn.
    #[default]
    Send,
}

/// Configuration shared by transformer operators.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformerConfig {
    /// Identity fields.
    #[serde(flatten)]
    pub basic: BasicConfig,
    /// Downstream references.
    #[serde(flatten)]
    pub writer: WriterConfig,
    /// Failure policy. Defaults to `send`.
    #[serde(default)]
    pub on_error: OnError,
}

impl TransformerConfig {
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

    /// Build the transformer half of the runtime operator.
    pub fn build(&self) -> Result<TransformerOperator, BuildError> {
        Ok(TransformerOperator {
            basic: self.basic.build()?,
            writer: self.writer.build(),
            on_error: self.on_error,
        })
    }
}

/// Runtime half shared by transformer operators.
pub struct TransformerOperator {
    basic: BasicOperator,
    writer: WriterOperator,
    on_error: OnError,
}

impl TransformerOperator {
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

    /// The configured failure policy.
    #[must_use]
    pub fn on_error(&self) -> OnError {
        self.on_error
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

    /// Forward an entry downstream without transforming it.
    pub async fn write(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        self.writer.write(ctx, entry).await
    }

    /// Apply `transform` to the entry and forward it downstream,
    /// honoring the failure policy when the transformation errors.
    pub async fn process_with<F>(
        &self,
        ctx: &CancellationToken,
        mut entry: Entry,
        transform: F,
    ) -> Result<(), ProcessError>
    where
        F: FnOnce(&mut Entry) -> Result<(), ProcessError>,
    {
        match transform(&mut entry) {
            Ok(()) => self.writer.write(ctx, entry).await,
            Err(err) => self.handle_failure(ctx, entry, err).await,
        }
    }

    /// Apply the failure policy to an entry whose transformation failed.
    ///
    /// `drop` returns the error without forwarding; `send` warns and
    /// forwards the entry in whatever state the transformation left it.
    pub async fn handle_failure(
        &self,
        ctx: &CancellationToken,
        entry: Entry,
        err: ProcessError,
    ) -> Result<(), ProcessError> {
        match self.on_error {
            OnError::Drop => Err(err),
            OnError::Send => {
                warn!(
                    operator_id = self.id(),
                    operator_type = self.operator_type(),
                    error = %err,
                    "entry transformation failed, forwarding entry",
                );
                self.writer.write(ctx, entry).await
            }
        }
    }
}
