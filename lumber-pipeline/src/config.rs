//! The config resolver: declarative nodes to a validated pipeline.
//!
//! Resolution runs validate → expand → build → wire → verify. Custom
//! template nodes expand into namespaced sub-pipelines; references to
//! the custom node land on the first node of its expansion.

use std::collections::HashMap;

use lumber_operator::config::{BuildContext, OperatorBuilder, Registry, add_namespace};
use lumber_operator::error::BuildError;
use tracing::warn;

use crate::error::ConfigError;
use crate::params::{Config, Params};
use crate::pipeline::Pipeline;
use crate::plugin::PluginRegistry;

/// Templates may nest, but not past this depth.
const MAX_TEMPLATE_DEPTH: usize = 10;

/// Sentinel reference inside templates for "the expansion's entry".
const SENTINEL_INPUT: &str = "input";
/// Sentinel reference inside templates for "the outer node's output".
const SENTINEL_OUTPUT: &str = "output";

/// One node of the expanded flat list.
pub(crate) struct ExpandedNode {
    pub(crate) builder: Box<dyn OperatorBuilder>,
    /// Wired in when the node declares no outputs and can output.
    pub(crate) implicit_output: Option<String>,
}

/// The result of expanding every top-level node.
#[derive(Default)]
struct Expansion {
    nodes: Vec<ExpandedNode>,
    /// Custom node id → the id entries addressed to it should reach.
    aliases: HashMap<String, String>,
}

impl Config {
    /// Build a runnable [`Pipeline`] from this configuration.
    ///
    /// `registry` supplies builtin types, `plugins` supplies custom
    /// templates; a name defined in both resolves to the builtin with a
    /// warning.
    pub fn build_pipeline(
        &self,
        registry: &Registry,
        plugins: &PluginRegistry,
        context: &BuildContext,
    ) -> Result<Pipeline, ConfigError> {
        if self.0.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut expansion = Expansion::default();
        expand_sequence(
            &self.0,
            "",
            None,
            registry,
            plugins,
            &mut expansion,
            0,
        )?;

        Pipeline::assemble(expansion.nodes, expansion.aliases, context)
    }
}

/// Expand one declaration sequence under `namespace`.
///
/// `terminal_output` is where the sequence's dangling tail should point:
/// for a template expansion it is the outer node's declared (or
/// implicit) output; for the top level there is none.
fn expand_sequence(
    nodes: &[Params],
    namespace: &str,
    terminal_output: Option<&str>,
    registry: &Registry,
    plugins: &PluginRegistry,
    expansion: &mut Expansion,
    depth: usize,
) -> Result<(), ConfigError> {
    let local_ids: Vec<String> = nodes.iter().map(|node| node.id().to_string()).collect();
    let in_template = depth > 0;
    let entry_id = local_ids
        .first()
        .map(|id| add_namespace(id, namespace, &[]));

    for (index, node) in nodes.iter().enumerate() {
        node.validate()?;

        let next_local = nodes
            .get(index + 1)
            .map(|next| add_namespace(next.id(), namespace, &[]));

        // Sentinel references only mean something inside a template.
        let mut node = node.clone();
        if in_template {
            let mut sentinel_error = None;
            node.rewrite_outputs(|reference| match reference {
                SENTINEL_OUTPUT => match terminal_output {
                    Some(output) => output.to_string(),
                    None => {
                        sentinel_error = Some(node_id_for_error(namespace, &local_ids, index));
                        reference.to_string()
                    }
                },
                SENTINEL_INPUT => entry_id.clone().unwrap_or_else(|| reference.to_string()),
                other => other.to_string(),
            });
            if let Some(id) = sentinel_error {
                return Err(ConfigError::Build(BuildError::MissingOutput {
                    id,
                    output: SENTINEL_OUTPUT.to_string(),
                }));
            }
        }

        let operator_type = node.operator_type().to_string();
        let is_builtin = registry.contains(&operator_type);
        if is_builtin && plugins.contains(&operator_type) {
            warn!(
                operator_type = %operator_type,
                "custom template is shadowed by a builtin operator type",
            );
        }

        if is_builtin {
            let mut builder = registry.create(&operator_type, node.to_value())?;
            // Prefix the node and its intra-sequence references; leave
            // references that point outside the namespace alone.
            let exclusions: Vec<String> = builder
                .output_ids()
                .into_iter()
                .filter(|reference| !local_ids.iter().any(|local| local == reference))
                .collect();
            builder.set_namespace(namespace, &exclusions);

            let implicit_output = if builder.output_ids().is_empty() {
                next_local.or_else(|| terminal_output.map(str::to_string))
            } else {
                None
            };
            expansion.nodes.push(ExpandedNode {
                builder,
                implicit_output,
            });
        } else if plugins.contains(&operator_type) {
            if depth >= MAX_TEMPLATE_DEPTH {
                return Err(ConfigError::RecursionLimit(operator_type));
            }
            let template = plugins
                .get(&operator_type)
                .ok_or_else(|| BuildError::UnknownType(operator_type.clone()))?;

            // The sub-pipeline's tail points at the outer node's
            // declared output, or falls back to the next node.
            let declared: Vec<String> = node
                .output_ids()
                .into_iter()
                .map(|reference| {
                    if local_ids.iter().any(|local| local == &reference) {
                        add_namespace(&reference, namespace, &[])
                    } else {
                        reference
                    }
                })
                .collect();
            if declared.len() > 1 {
                warn!(
                    id = node.id(),
                    "custom operators forward through a single output; extra outputs ignored",
                );
            }
            let child_terminal = declared
                .into_iter()
                .next()
                .or(next_local)
                .or_else(|| terminal_output.map(str::to_string));

            let child_namespace = add_namespace(node.id(), namespace, &[]);
            let rendered = template.render(&node)?;
            expansion.aliases.insert(
                child_namespace.clone(),
                add_namespace(rendered[0].id(), &child_namespace, &[]),
            );
            expand_sequence(
                &rendered,
                &child_namespace,
                child_terminal.as_deref(),
                registry,
                plugins,
                expansion,
                depth + 1,
            )?;
        } else {
            return Err(ConfigError::Build(BuildError::UnknownType(operator_type)));
        }
    }
    Ok(())
}

fn node_id_for_error(namespace: &str, local_ids: &[String], index: usize) -> String {
    local_ids
        .get(index)
        .map(|id| add_namespace(id, namespace, &[]))
        .unwrap_or_else(|| namespace.to_string())
}
