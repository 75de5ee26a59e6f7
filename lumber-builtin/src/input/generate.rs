//! Generate input: emits a configured record repeatedly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lumber_entry::{Entry, Value};
use lumber_operator::config::{BuildContext, OperatorBuilder};
use lumber_operator::error::{BuildError, OperatorError};
use lumber_operator::helper::{InputConfig, InputOperator};
use lumber_operator::operator::Operator;
use serde::Deserialize;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// Configuration of the `generate_input` operator.
///
/// Useful for demos, benchmarks, and drain tests: produces `count`
/// copies of `record` (0 means until stopped), optionally pacing them
/// with `interval`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateInputConfig {
    /// Input archetype fields.
    #[serde(flatten)]
    pub input: InputConfig,
    /// The record each generated entry carries.
    pub record: Value,
    /// How many entries to produce; 0 produces until stopped.
    #[serde(default)]
    pub count: u64,
    /// Pause between entries.
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
}

impl OperatorBuilder for GenerateInputConfig {
    fn id(&self) -> &str {
        self.input.id()
    }

    fn operator_type(&self) -> &str {
        self.input.operator_type()
    }

    fn output_ids(&self) -> Vec<String> {
        self.input.output_ids()
    }

    fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.input.set_namespace(namespace, exclusions);
    }

    fn build(&self, context: &BuildContext) -> Result<Arc<dyn Operator>, BuildError> {
        Ok(Arc::new(GenerateInput {
            input: Arc::new(self.input.build(context)?),
            record: self.record.clone(),
            count: self.count,
            interval: self.interval,
            tracker: TaskTracker::new(),
        }))
    }
}

/// The `generate_input` operator.
pub struct GenerateInput {
    input: Arc<InputOperator>,
    record: Value,
    count: u64,
    interval: Option<Duration>,
    tracker: TaskTracker,
}

#[async_trait]
impl Operator for GenerateInput {
    fn id(&self) -> &str {
        self.input.id()
    }

    fn operator_type(&self) -> &str {
        self.input.operator_type()
    }

    fn can_output(&self) -> bool {
        true
    }

    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.input.outputs()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        self.input.set_outputs(outputs)
    }

    fn can_process(&self) -> bool {
        false
    }

    async fn start(&self) -> Result<(), OperatorError> {
        let input = Arc::clone(&self.input);
        let record = self.record.clone();
        let count = self.count;
        let interval = self.interval;
        let token = self.input.cancellation().clone();
        self.tracker.spawn(async move {
            let mut produced: u64 = 0;
            while count == 0 || produced < count {
                if token.is_cancelled() {
                    break;
                }
                let entry = Entry::from_record(record.clone());
                if let Err(err) = input.write(&token, entry).await {
                    warn!(
                        operator_id = input.id(),
                        error = %err,
                        "downstream rejected entry",
                    );
                }
                produced += 1;
                if let Some(interval) = interval {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = token.cancelled() => break,
                    }
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), OperatorError> {
        self.input.cancellation().cancel();
        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }
}
