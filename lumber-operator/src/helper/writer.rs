//! The writer half of operators that send entries downstream.

use std::sync::{Arc, OnceLock};

use lumber_entry::Entry;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::add_namespace;
use crate::error::{BuildError, ProcessError};
use crate::operator::Operator;

/// Declared downstream references: a single `output` or an `outputs`
/// list. Both may be present; they are concatenated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriterConfig {
    /// A single downstream id.
    #[serde(default)]
    pub output: Option<String>,
    /// Several downstream ids.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl WriterConfig {
    /// All declared downstream ids, in declaration order.
    #[must_use]
    pub fn output_ids(&self) -> Vec<String> {
        self.output
            .iter()
            .chain(self.outputs.iter())
            .cloned()
            .collect()
    }

    /// Move the references into `namespace`, leaving exclusions alone.
    pub fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        if let Some(output) = &mut self.output {
            *output = add_namespace(output, namespace, exclusions);
        }
        for output in &mut self.outputs {
            *output = add_namespace(output, namespace, exclusions);
        }
    }

    /// Build the runtime writer.
    #[must_use]
    pub fn build(&self) -> WriterOperator {
        WriterOperator {
            output_ids: self.output_ids(),
            outputs: OnceLock::new(),
        }
    }
}

/// Runtime fan-out to resolved downstream operators.
///
/// References are resolved exactly once by the config resolver. The
/// entry is cloned for every output but the last, which receives the
/// original.
#[derive(Default)]
pub struct WriterOperator {
    output_ids: Vec<String>,
    outputs: OnceLock<Vec<Arc<dyn Operator>>>,
}

impl WriterOperator {
    /// The declared downstream ids.
    #[must_use]
    pub fn output_ids(&self) -> &[String] {
        &self.output_ids
    }

    /// The resolved downstream operators.
    #[must_use]
    pub fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.outputs.get().cloned().unwrap_or_default()
    }

    /// Resolve the downstream references. Errors on a second call.
    pub fn set_outputs(
        &self,
        id: &str,
        outputs: Vec<Arc<dyn Operator>>,
    ) -> Result<(), BuildError> {
        self.outputs
            .set(outputs)
            .map_err(|_| BuildError::OutputsAlreadySet { id: id.to_string() })
    }

    /// Hand `entry` to every resolved output.
    ///
    /// The first downstream error propagates to the caller; an entry with
    /// no outputs is dropped.
    pub async fn write(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        let outputs = self.outputs();
        let Some((last, rest)) = outputs.split_last() else {
            return Ok(());
        };
        for output in rest {
            output.process(ctx, entry.clone()).await?;
        }
        last.process(ctx, entry).await
    }
}
