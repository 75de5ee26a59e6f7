//! Noop transformer: forwards entries unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use lumber_entry::Entry;
use lumber_operator::config::{BuildContext, OperatorBuilder};
use lumber_operator::error::{BuildError, ProcessError};
use lumber_operator::helper::{TransformerConfig, TransformerOperator};
use lumber_operator::operator::Operator;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Configuration of the `noop` operator.
#[derive(Debug, Clone, Deserialize)]
pub struct NoopConfig {
    /// Transformer archetype fields.
    #[serde(flatten)]
    pub transformer: TransformerConfig,
}

impl OperatorBuilder for NoopConfig {
    fn id(&self) -> &str {
        self.transformer.id()
    }

    fn operator_type(&self) -> &str {
        self.transformer.operator_type()
    }

    fn output_ids(&self) -> Vec<String> {
        self.transformer.output_ids()
    }

    fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.transformer.set_namespace(namespace, exclusions);
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, BuildError> {
        Ok(Arc::new(Noop {
            transformer: self.transformer.build()?,
        }))
    }
}

/// The `noop` operator. Handy as a template placeholder and in tests.
pub struct Noop {
    transformer: TransformerOperator,
}

#[async_trait]
impl Operator for Noop {
    fn id(&self) -> &str {
        self.transformer.id()
    }

    fn operator_type(&self) -> &str {
        self.transformer.operator_type()
    }

    fn can_output(&self) -> bool {
        true
    }

    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.transformer.outputs()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        self.transformer.set_outputs(outputs)
    }

    fn can_process(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        self.transformer.write(ctx, entry).await
    }
}
