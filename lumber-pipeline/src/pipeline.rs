//! The runtime graph: topology, lifecycle, DOT export.

use std::collections::HashMap;
use std::sync::Arc;

use lumber_operator::config::BuildContext;
use lumber_operator::error::{BuildError, OperatorError};
use lumber_operator::operator::Operator;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ExpandedNode;
use crate::error::{ConfigError, PipelineError, StopError};

/// Lifecycle of a built pipeline.
enum Lifecycle {
    Built,
    Started,
    /// Keeps the stop outcome so a second `stop` returns it unchanged.
    Stopped(Option<StopError>),
}

/// A validated, runnable operator graph.
///
/// Owns its operators. Operators and edges are held in a deterministic
/// topological order (producers before consumers, ties broken by id),
/// which start/stop walk and the DOT export follows.
pub struct Pipeline {
    graph: DiGraph<Arc<dyn Operator>, ()>,
    /// Topological order of graph indices: producers first.
    order: Vec<NodeIndex>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("node_count", &self.graph.node_count())
            .field("order", &self.order)
            .finish()
    }
}

impl Pipeline {
    /// Build, wire, and validate the expanded node list.
    pub(crate) fn assemble(
        nodes: Vec<ExpandedNode>,
        aliases: HashMap<String, String>,
        context: &BuildContext,
    ) -> Result<Self, ConfigError> {
        // Instantiate in declaration order, rejecting id collisions.
        let mut operators: Vec<Arc<dyn Operator>> = Vec::with_capacity(nodes.len());
        let mut by_id: HashMap<String, usize> = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            let operator = node.builder.build(context)?;
            let id = operator.id().to_string();
            if by_id.insert(id.clone(), operators.len()).is_some() {
                return Err(ConfigError::DuplicateId(id));
            }
            operators.push(operator);
        }

        // Resolve references into direct edges. References to a custom
        // node follow the alias chain to its expansion's entry node.
        let resolve = |reference: &str| -> Option<usize> {
            let mut current = reference.to_string();
            for _ in 0..=aliases.len() {
                if let Some(index) = by_id.get(&current) {
                    return Some(*index);
                }
                match aliases.get(&current) {
                    Some(next) => current = next.clone(),
                    None => return None,
                }
            }
            None
        };

        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (index, (node, operator)) in nodes.iter().zip(&operators).enumerate() {
            let mut references = node.builder.output_ids();
            if references.is_empty() && operator.can_output() {
                match &node.implicit_output {
                    Some(implicit) => references.push(implicit.clone()),
                    None => {
                        return Err(ConfigError::MissingTerminal {
                            id: operator.id().to_string(),
                        });
                    }
                }
            }

            let mut resolved = Vec::with_capacity(references.len());
            for reference in &references {
                let target = resolve(reference).ok_or_else(|| BuildError::MissingOutput {
                    id: operator.id().to_string(),
                    output: reference.clone(),
                })?;
                resolved.push(target);
            }
            if !resolved.is_empty() {
                operator
                    .set_outputs(resolved.iter().map(|i| operators[*i].clone()).collect())
                    .map_err(ConfigError::Build)?;
                edges.extend(resolved.into_iter().map(|target| (index, target)));
            }
        }

        // A processing node nothing feeds will never see an entry.
        let mut fed = vec![false; operators.len()];
        for (_, target) in &edges {
            fed[*target] = true;
        }
        for (operator, fed) in operators.iter().zip(&fed) {
            if operator.can_process() && !fed {
                warn!(
                    operator_id = operator.id(),
                    operator_type = operator.operator_type(),
                    "operator has no upstream and will receive no entries",
                );
            }
        }

        let (graph, order) = validate_graph(operators, edges)?;
        Ok(Self {
            graph,
            order,
            lifecycle: Mutex::new(Lifecycle::Built),
        })
    }

    /// The operators, producers first.
    #[must_use]
    pub fn operators(&self) -> Vec<Arc<dyn Operator>> {
        self.order
            .iter()
            .map(|index| Arc::clone(&self.graph[*index]))
            .collect()
    }

    /// Start every operator, consumers first, so that a producer never
    /// runs before its downstream is ready.
    ///
    /// On failure the operators already started are stopped again, in
    /// reverse, and the original error is returned.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Built => {}
            Lifecycle::Started => return Err(PipelineError::AlreadyStarted),
            Lifecycle::Stopped(_) => return Err(PipelineError::Stopped),
        }

        let mut started: Vec<Arc<dyn Operator>> = Vec::new();
        for index in self.order.iter().rev() {
            let operator = &self.graph[*index];
            debug!(operator_id = operator.id(), "starting operator");
            if let Err(err) = operator.start().await {
                error!(
                    operator_id = operator.id(),
                    error = %err,
                    "operator failed to start, unwinding",
                );
                for started in started.iter().rev() {
                    if let Err(stop_err) = started.stop().await {
                        warn!(
                            operator_id = started.id(),
                            error = %stop_err,
                            "operator failed to stop during unwind",
                        );
                    }
                }
                return Err(err.into());
            }
            started.push(Arc::clone(operator));
        }

        info!(operators = self.order.len(), "pipeline started");
        *lifecycle = Lifecycle::Started;
        Ok(())
    }

    /// Stop every operator, producers first, so sources quiesce before
    /// the sinks draining them.
    ///
    /// Best-effort: every operator is attempted and failures are
    /// aggregated. Idempotent: a second call returns the first call's
    /// result without touching the operators.
    pub async fn stop(&self) -> Result<(), StopError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match &*lifecycle {
            Lifecycle::Stopped(result) => {
                return match result {
                    None => Ok(()),
                    Some(err) => Err(err.clone()),
                };
            }
            Lifecycle::Built => {
                *lifecycle = Lifecycle::Stopped(None);
                return Ok(());
            }
            Lifecycle::Started => {}
        }

        let mut failures: Vec<OperatorError> = Vec::new();
        for index in &self.order {
            let operator = &self.graph[*index];
            debug!(operator_id = operator.id(), "stopping operator");
            if let Err(err) = operator.stop().await {
                warn!(operator_id = operator.id(), error = %err, "operator failed to stop");
                failures.push(err);
            }
        }

        let result = if failures.is_empty() {
            None
        } else {
            Some(StopError { failures })
        };
        info!("pipeline stopped");
        *lifecycle = Lifecycle::Stopped(result.clone());
        match result {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Serialize the graph as DOT.
    ///
    /// Nodes are labeled `<id> (<type>)`; edges run producer → consumer.
    /// Output is deterministic: topological order, ties by id.
    #[must_use]
    pub fn marshal_dot(&self) -> String {
        let mut dot = String::from("digraph G {\n");
        for index in &self.order {
            let operator = &self.graph[*index];
            dot.push_str(&format!(
                "  \"{}\" [label=\"{} ({})\"];\n",
                operator.id(),
                operator.id(),
                operator.operator_type(),
            ));
        }
        for index in &self.order {
            let source = self.graph[*index].id();
            let mut targets: Vec<&str> = self
                .graph
                .neighbors_directed(*index, Direction::Outgoing)
                .map(|target| self.graph[target].id())
                .collect();
            targets.sort_unstable();
            for target in targets {
                dot.push_str(&format!("  \"{source}\" -> \"{target}\";\n"));
            }
        }
        dot.push_str("}\n");
        dot
    }
}

/// Build the petgraph representation and the deterministic topological
/// order, rejecting cycles.
#[allow(clippy::type_complexity)]
fn validate_graph(
    operators: Vec<Arc<dyn Operator>>,
    edges: Vec<(usize, usize)>,
) -> Result<(DiGraph<Arc<dyn Operator>, ()>, Vec<NodeIndex>), ConfigError> {
    let mut graph: DiGraph<Arc<dyn Operator>, ()> = DiGraph::with_capacity(operators.len(), edges.len());
    let indices: Vec<NodeIndex> = operators.into_iter().map(|op| graph.add_node(op)).collect();
    for (source, target) in edges {
        graph.update_edge(indices[source], indices[target], ());
    }

    // Kahn's algorithm with a lexicographic heap: topological order with
    // deterministic tie-breaking, and cycle detection when nodes remain.
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|index| {
            (
                index,
                graph.neighbors_directed(index, Direction::Incoming).count(),
            )
        })
        .collect();

    let mut ready: std::collections::BinaryHeap<std::cmp::Reverse<(String, NodeIndex)>> = graph
        .node_indices()
        .filter(|index| in_degree[index] == 0)
        .map(|index| std::cmp::Reverse((graph[index].id().to_string(), index)))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(std::cmp::Reverse((_, index))) = ready.pop() {
        order.push(index);
        for neighbor in graph.neighbors_directed(index, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&neighbor) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(std::cmp::Reverse((
                        graph[neighbor].id().to_string(),
                        neighbor,
                    )));
                }
            }
        }
    }

    if order.len() < graph.node_count() {
        let mut cyclic: Vec<&str> = graph
            .node_indices()
            .filter(|index| !order.contains(index))
            .map(|index| graph[index].id())
            .collect();
        cyclic.sort_unstable();
        return Err(ConfigError::Cycle(cyclic.join(", ")));
    }

    Ok((graph, order))
}
