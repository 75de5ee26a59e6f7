//! Config resolution tests over the builtin operator set.

use lumber_operator::config::{BuildContext, Registry};
use lumber_pipeline::{Config, PluginRegistry, parse_config};

fn registry() -> Registry {
    let mut registry = Registry::new();
    lumber_builtin::register_all(&mut registry).expect("builtins register once");
    registry
}

fn config(yaml: &str) -> Config {
    parse_config(yaml).expect("valid config yaml")
}

const LINEAR: &str = r"
pipeline:
  - id: in
    type: generate_input
    record: hello
    count: 1
  - id: mid
    type: noop
  - id: out
    type: stdout
";

#[test]
fn expanded_nodes_match_built_operators() {
    let pipeline = config(LINEAR)
        .build_pipeline(&registry(), &PluginRegistry::new(), &BuildContext::new())
        .expect("builds");
    assert_eq!(pipeline.operators().len(), 3);
}

#[test]
fn implicit_wiring_chains_declaration_order() {
    let pipeline = config(LINEAR)
        .build_pipeline(&registry(), &PluginRegistry::new(), &BuildContext::new())
        .expect("builds");
    let dot = pipeline.marshal_dot();
    assert!(dot.contains("\"in\" -> \"mid\""));
    assert!(dot.contains("\"mid\" -> \"out\""));
}

#[test]
fn trailing_transformer_is_rejected() {
    let err = config(
        r"
pipeline:
  - id: in
    type: generate_input
    record: hello
  - id: mid
    type: noop
",
    )
    .build_pipeline(&registry(), &PluginRegistry::new(), &BuildContext::new())
    .unwrap_err();
    assert!(err.to_string().contains("mid"));
}

#[test]
fn unknown_type_is_fatal() {
    let err = config(
        r"
pipeline:
  - id: in
    type: csv_input
",
    )
    .build_pipeline(&registry(), &PluginRegistry::new(), &BuildContext::new())
    .unwrap_err();
    assert!(err.to_string().contains("csv_input"));
}

#[test]
fn duplicate_top_level_ids_are_fatal() {
    let err = config(
        r"
pipeline:
  - id: dup
    type: generate_input
    record: a
    output: out
  - id: dup
    type: noop
    output: out
  - id: out
    type: stdout
",
    )
    .build_pipeline(&registry(), &PluginRegistry::new(), &BuildContext::new())
    .unwrap_err();
    assert!(err.to_string().contains("dup"));
}

#[test]
fn dangling_output_reference_is_fatal() {
    let err = config(
        r"
pipeline:
  - id: in
    type: generate_input
    record: a
    output: vanished
  - id: out
    type: stdout
",
    )
    .build_pipeline(&registry(), &PluginRegistry::new(), &BuildContext::new())
    .unwrap_err();
    assert!(err.to_string().contains("vanished"));
}

#[test]
fn cyclic_references_are_fatal() {
    let err = config(
        r"
pipeline:
  - id: a
    type: noop
    output: b
  - id: b
    type: noop
    output: a
",
    )
    .build_pipeline(&registry(), &PluginRegistry::new(), &BuildContext::new())
    .unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

const THREE_NODE_TEMPLATE: &str = r"
parameters:
  tag:
    type: string
    default: forwarded
pipeline:
  - id: n1
    type: noop
    output: n2
  - id: n2
    type: noop
    output: n3
  - id: n3
    type: noop
    output: output
";

#[test]
fn template_expansion_namespaces_and_rewires() {
    let mut plugins = PluginRegistry::new();
    plugins
        .add("relay", THREE_NODE_TEMPLATE)
        .expect("template parses");

    let pipeline = config(
        r"
pipeline:
  - id: in
    type: generate_input
    record: hello
    output: a
  - id: a
    type: relay
    output: b
  - id: b
    type: stdout
",
    )
    .build_pipeline(&registry(), &plugins, &BuildContext::new())
    .expect("builds");

    let ids: Vec<String> = pipeline
        .operators()
        .iter()
        .map(|op| op.id().to_string())
        .collect();
    assert_eq!(ids, vec!["in", "a.n1", "a.n2", "a.n3", "b"]);

    let dot = pipeline.marshal_dot();
    // Upstream references to the custom node land on its entry.
    assert!(dot.contains("\"in\" -> \"a.n1\""));
    assert!(dot.contains("\"a.n1\" -> \"a.n2\""));
    assert!(dot.contains("\"a.n2\" -> \"a.n3\""));
    // The sentinel forwards to the outer node's declared output.
    assert!(dot.contains("\"a.n3\" -> \"b\""));
}

#[test]
fn template_tail_falls_back_to_next_node() {
    let mut plugins = PluginRegistry::new();
    // No sentinel: the template tail is implicitly chained.
    plugins
        .add(
            "tail",
            r"
parameters: {}
pipeline:
  - id: n1
    type: noop
",
        )
        .expect("template parses");

    let pipeline = config(
        r"
pipeline:
  - id: in
    type: generate_input
    record: hello
  - id: a
    type: tail
  - id: b
    type: stdout
",
    )
    .build_pipeline(&registry(), &plugins, &BuildContext::new())
    .expect("builds");

    let dot = pipeline.marshal_dot();
    assert!(dot.contains("\"in\" -> \"a.n1\""));
    assert!(dot.contains("\"a.n1\" -> \"b\""));
}

#[test]
fn nested_templates_stack_namespaces() {
    let mut plugins = PluginRegistry::new();
    plugins
        .add(
            "inner",
            r"
parameters: {}
pipeline:
  - id: leaf
    type: noop
    output: output
",
        )
        .expect("inner parses");
    plugins
        .add(
            "outer",
            r"
parameters: {}
pipeline:
  - id: wrap
    type: inner
    output: output
",
        )
        .expect("outer parses");

    let pipeline = config(
        r"
pipeline:
  - id: in
    type: generate_input
    record: hello
    output: a
  - id: a
    type: outer
    output: b
  - id: b
    type: stdout
",
    )
    .build_pipeline(&registry(), &plugins, &BuildContext::new())
    .expect("builds");

    let ids: Vec<String> = pipeline
        .operators()
        .iter()
        .map(|op| op.id().to_string())
        .collect();
    assert_eq!(ids, vec!["in", "a.wrap.leaf", "b"]);

    let dot = pipeline.marshal_dot();
    assert!(dot.contains("\"in\" -> \"a.wrap.leaf\""));
    assert!(dot.contains("\"a.wrap.leaf\" -> \"b\""));
}

#[test]
fn templates_load_from_a_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("relay.yaml"), THREE_NODE_TEMPLATE).expect("write template");
    std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write extra file");

    let plugins = PluginRegistry::load_dir(dir.path()).expect("loads");
    assert!(plugins.contains("relay"));
    assert!(!plugins.contains("notes"));

    // A missing directory is just an empty registry.
    let empty = PluginRegistry::load_dir(&dir.path().join("missing")).expect("loads empty");
    assert!(!empty.contains("relay"));
}

#[test]
fn template_parameters_flow_into_operator_config() {
    let mut plugins = PluginRegistry::new();
    plugins
        .add(
            "tagger",
            r"
parameters:
  pattern:
    type: string
    required: true
pipeline:
  - id: n1
    type: regex_parser
    regex: {{ .pattern }}
    output: output
",
        )
        .expect("template parses");

    let pipeline = config(
        r"
pipeline:
  - id: in
    type: generate_input
    record: 'info: hi'
    output: a
  - id: a
    type: tagger
    pattern: '^(?P<level>\w+): (?P<msg>.*)$'
    output: b
  - id: b
    type: stdout
",
    )
    .build_pipeline(&registry(), &plugins, &BuildContext::new())
    .expect("template parameter reaches the regex config");
    assert_eq!(pipeline.operators().len(), 3);
}
