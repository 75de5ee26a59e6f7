//! The `Operator` trait — the polymorphic pipeline node.

use std::sync::Arc;

use async_trait::async_trait;
use lumber_entry::Entry;
use tokio_util::sync::CancellationToken;

use crate::error::{BuildError, OperatorError, ProcessError};

/// A node in the pipeline graph.
///
/// Operators come in three archetypes, expressed through the two
/// capability flags rather than a type hierarchy:
///
/// | archetype   | `can_process` | `can_output` |
/// |-------------|---------------|--------------|
/// | input       | false         | true         |
/// | transformer | true          | true         |
/// | output      | true          | false        |
///
/// Operators hold weak references (ids) to their downstream operators in
/// configuration; the config resolver calls [`set_outputs`] exactly once
/// at build time to replace them with direct references. The graph must
/// be acyclic.
///
/// No entry may be delivered before `start` completes or after `stop`
/// returns. Implementations must not hold a lock across a call to a
/// downstream operator's `process`.
///
/// [`set_outputs`]: Operator::set_outputs
#[async_trait]
pub trait Operator: Send + Sync {
    /// The operator's unique id within the pipeline.
    fn id(&self) -> &str;

    /// The registered type this operator was built from.
    fn operator_type(&self) -> &str;

    /// Whether this operator sends entries downstream.
    fn can_output(&self) -> bool;

    /// The resolved downstream operators. Empty until [`set_outputs`]
    /// is called, and always empty for output operators.
    ///
    /// [`set_outputs`]: Operator::set_outputs
    fn outputs(&self) -> Vec<Arc<dyn Operator>>;

    /// Resolve the operator's downstream references. Called once by the
    /// config resolver; errors if the operator cannot output or if the
    /// outputs were already resolved.
    fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError>;

    /// Whether this operator accepts entries via [`process`].
    ///
    /// [`process`]: Operator::process
    fn can_process(&self) -> bool;

    /// Take ownership of `entry`, perform this operator's work, and hand
    /// the result to the downstream operators (or, for outputs, to the
    /// operator's buffer). Runs synchronously on the caller's task.
    async fn process(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        let _ = (ctx, entry);
        Err(ProcessError::NotSupported {
            id: self.id().to_string(),
        })
    }

    /// Begin operation. Inputs start their producer tasks here; outputs
    /// start their flush loop.
    async fn start(&self) -> Result<(), OperatorError> {
        Ok(())
    }

    /// Stop gracefully: stop accepting new work, drain what was already
    /// accepted, and return only once all owned tasks have finished.
    async fn stop(&self) -> Result<(), OperatorError> {
        Ok(())
    }
}
