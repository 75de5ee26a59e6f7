//! Stdout output: one JSON object per line.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lumber_entry::Entry;
use lumber_operator::config::{BuildContext, OperatorBuilder};
use lumber_operator::error::{BuildError, ProcessError};
use lumber_operator::helper::{OutputConfig, OutputOperator};
use lumber_operator::operator::Operator;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Configuration of the `stdout` operator.
#[derive(Debug, Clone, Deserialize)]
pub struct StdoutConfig {
    /// Output archetype fields.
    #[serde(flatten)]
    pub output: OutputConfig,
}

impl OperatorBuilder for StdoutConfig {
    fn id(&self) -> &str {
        self.output.id()
    }

    fn operator_type(&self) -> &str {
        self.output.operator_type()
    }

    fn output_ids(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.output.set_namespace(namespace, exclusions);
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, BuildError> {
        Ok(Arc::new(Stdout {
            output: self.output.build()?,
            writer: Mutex::new(Box::new(std::io::stdout())),
        }))
    }
}

/// A debugging sink that writes entries as JSON lines.
///
/// Writes go to stdout; tests swap the writer. Purely local I/O, so
/// entries are written inline rather than buffered.
pub struct Stdout {
    output: OutputOperator,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl Stdout {
    /// Replace the destination writer.
    pub fn set_writer(&self, writer: Box<dyn Write + Send>) {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        *guard = writer;
    }
}

#[async_trait]
impl Operator for Stdout {
    fn id(&self) -> &str {
        self.output.id()
    }

    fn operator_type(&self) -> &str {
        self.output.operator_type()
    }

    fn can_output(&self) -> bool {
        false
    }

    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        Vec::new()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        if outputs.is_empty() {
            return Ok(());
        }
        self.output.refuse_outputs()
    }

    fn can_process(&self) -> bool {
        true
    }

    async fn process(&self, _ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        let line = serde_json::to_string(&entry).map_err(|err| ProcessError::ParseFailed {
            message: format!("failed to encode entry: {err}"),
        })?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = writeln!(writer, "{line}") {
            warn!(operator_id = self.id(), error = %err, "stdout write failed");
        }
        Ok(())
    }
}
