use loomcore::{Edge, NodeId, NodeSpec, WorkflowError};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::HashMap;

/// Nodes grouped into levels that can run concurrently.
///
/// Every node appears in exactly one level, and every node sits in a later
/// level than all of its predecessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub levels: Vec<Vec<NodeId>>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn level_of(&self, node_id: &str) -> Option<usize> {
        self.levels.iter().position(|level| level.iter().any(|id| id == node_id))
    }
}

/// Level the graph with Kahn's algorithm.
///
/// Edges with an endpoint outside `nodes` are ignored. Nodes inside a level
/// keep their order from `nodes`, so the same graph always yields the same plan.
pub fn build_execution_plan(nodes: &[NodeSpec], edges: &[Edge]) -> Result<ExecutionPlan, WorkflowError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(nodes.len(), edges.len());
    let mut node_to_index: HashMap<&str, NodeIndex> = HashMap::with_capacity(nodes.len());

    for node in nodes {
        if !node_to_index.contains_key(node.id.as_str()) {
            let idx = graph.add_node(node.id.as_str());
            node_to_index.insert(node.id.as_str(), idx);
        }
    }

    for edge in edges {
        match (node_to_index.get(edge.source.as_str()), node_to_index.get(edge.target.as_str())) {
            (Some(from), Some(to)) => {
                graph.add_edge(*from, *to, ());
            }
            _ => tracing::debug!("Ignoring dangling edge {} ({} -> {})", edge.id, edge.source, edge.target),
        }
    }

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();

    let mut frontier: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();

    let mut levels = Vec::new();
    let mut emitted = 0;

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for &idx in &frontier {
            for successor in graph.neighbors_directed(idx, Direction::Outgoing) {
                let degree = &mut in_degree[successor.index()];
                *degree -= 1;
                if *degree == 0 {
                    next.push(successor);
                }
            }
        }

        emitted += frontier.len();
        levels.push(frontier.iter().map(|idx| graph[*idx].to_string()).collect());

        next.sort();
        frontier = next;
    }

    if emitted < graph.node_count() {
        tracing::warn!(
            "Cycle detected: {} of {} nodes could not be scheduled",
            graph.node_count() - emitted,
            graph.node_count()
        );
        return Err(WorkflowError::CycleDetected);
    }

    Ok(ExecutionPlan { levels })
}
