//! End-to-end tests: YAML config to running pipeline and back down.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use lumber_entry::{Entry, Severity};
use lumber_operator::config::{BuildContext, OperatorBuilder, Registry};
use lumber_operator::error::{BuildError, ProcessError};
use lumber_operator::helper::OutputConfig;
use lumber_operator::operator::Operator;
use lumber_pipeline::{PluginRegistry, parse_config};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Entries received by `counting_output` operators, keyed by operator
/// id. Tests use unique ids so they can share the binary.
static RECEIVED: LazyLock<Mutex<HashMap<String, Vec<Entry>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn received(id: &str) -> Vec<Entry> {
    RECEIVED
        .lock()
        .expect("test lock poisoned")
        .get(id)
        .cloned()
        .unwrap_or_default()
}

/// A test sink that records everything it is handed.
#[derive(Debug, Clone, Deserialize)]
struct CountingConfig {
    #[serde(flatten)]
    output: OutputConfig,
}

impl OperatorBuilder for CountingConfig {
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
        Ok(Arc::new(CountingOutput {
            id: self.output.id().to_string(),
            outputs: OnceLock::new(),
        }))
    }
}

struct CountingOutput {
    id: String,
    outputs: OnceLock<Vec<Arc<dyn Operator>>>,
}

#[async_trait]
impl Operator for CountingOutput {
    fn id(&self) -> &str {
        &self.id
    }
    fn operator_type(&self) -> &str {
        "counting_output"
    }
    fn can_output(&self) -> bool {
        false
    }
    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        Vec::new()
    }
    fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        if outputs.is_empty() {
            let _ = self.outputs.set(outputs);
            return Ok(());
        }
        Err(BuildError::CannotOutput {
            id: self.id.clone(),
        })
    }
    fn can_process(&self) -> bool {
        true
    }
    async fn process(&self, _ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        RECEIVED
            .lock()
            .expect("test lock poisoned")
            .entry(self.id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }
}

fn test_registry() -> Registry {
    let mut registry = lumber::default_registry().expect("builtins register once");
    registry
        .register::<CountingConfig>("counting_output")
        .expect("test sink registers");
    registry
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn parses_and_enriches_entries_end_to_end() {
    let config = parse_config(
        r#"
pipeline:
  - id: e2e-source
    type: generate_input
    count: 3
    record: '{"sev": "warn", "message": "disk nearly full"}'
  - id: e2e-parse
    type: json_parser
    severity:
      parse_from: sev
  - id: e2e-collect
    type: counting_output
"#,
    )
    .expect("config parses");

    let pipeline = config
        .build_pipeline(&test_registry(), &PluginRegistry::new(), &BuildContext::new())
        .expect("pipeline builds");
    pipeline.start().await.expect("pipeline starts");
    wait_until(|| received("e2e-collect").len() >= 3).await;
    pipeline.stop().await.expect("pipeline stops");

    let entries = received("e2e-collect");
    assert_eq!(entries.len(), 3);
    for entry in &entries {
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(
            entry.record,
            json!({"sev": "warn", "message": "disk nearly full"}),
        );
    }
}

#[tokio::test]
async fn stop_drains_everything_the_input_produced() {
    let config = parse_config(
        r"
pipeline:
  - id: drain-source
    type: generate_input
    count: 1000
    record: payload
  - id: drain-noop
    type: noop
  - id: drain-collect
    type: counting_output
",
    )
    .expect("config parses");

    let pipeline = config
        .build_pipeline(&test_registry(), &PluginRegistry::new(), &BuildContext::new())
        .expect("pipeline builds");
    pipeline.start().await.expect("pipeline starts");
    wait_until(|| received("drain-collect").len() >= 1000).await;
    pipeline.stop().await.expect("pipeline stops");

    // Every produced entry was delivered exactly once, and stop added
    // nothing and lost nothing.
    let entries = received("drain-collect");
    assert_eq!(entries.len(), 1000);
    assert!(entries.iter().all(|entry| entry.record == json!("payload")));
}

#[tokio::test]
async fn dot_export_is_stable_for_the_same_config() {
    let yaml = r"
pipeline:
  - id: dot-in
    type: generate_input
    record: x
  - id: dot-mid
    type: noop
  - id: dot-collect
    type: counting_output
";
    let build = || {
        parse_config(yaml)
            .expect("config parses")
            .build_pipeline(&test_registry(), &PluginRegistry::new(), &BuildContext::new())
            .expect("pipeline builds")
    };
    let dot = build().marshal_dot();
    assert_eq!(dot, build().marshal_dot());
    assert!(dot.contains("\"dot-in\" [label=\"dot-in (generate_input)\"]"));
    assert!(dot.contains("\"dot-in\" -> \"dot-mid\""));
    assert!(dot.contains("\"dot-mid\" -> \"dot-collect\""));
}
