//! In-engine thought arena.
//!
//! Unlike the persisted store, thoughts live only for the duration of one
//! search run and are keyed by a monotonically increasing index, so parent
//! and child relations are plain index lists. Nodes are appended, never
//! removed; pruning and discarding are state transitions, which keeps the
//! full exploration auditable after the run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::graph::EdgeRelation;

/// Index of a thought within one search run's arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ThoughtId(pub usize);

impl std::fmt::Display for ThoughtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// How a thought came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtOrigin {
    /// The root problem statement.
    Seed,
    /// Produced by an oracle generation call.
    Generation,
    /// Synthesized from two or more similar thoughts.
    Aggregation,
    /// Rewritten from a promising-but-flawed thought.
    Refinement,
    /// Injected by the caller.
    UserInput,
}

/// Lifecycle state of a thought.
///
/// Seed -> Generated -> Scored -> Active or Pruned; active thoughts may
/// later become Aggregated or Refined (consumed as inputs), and end as
/// Selected or Discarded. Failed marks an oracle error on either the
/// generation or the scoring call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtState {
    Seed,
    Generated,
    Scored,
    Active,
    Pruned,
    Aggregated,
    Refined,
    Selected,
    Discarded,
    Failed,
}

/// One thought in the arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtNode {
    pub id: ThoughtId,
    pub content: String,
    /// Distance from the seed: max over parent depths, plus one.
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub origin: ThoughtOrigin,
    pub state: ThoughtState,
    /// Parents in declaration order; the first one is the primary parent.
    pub parents: Vec<ThoughtId>,
    pub children: Vec<ThoughtId>,
}

/// Typed cross-link between two thoughts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtEdge {
    pub source: ThoughtId,
    pub target: ThoughtId,
    pub relation: EdgeRelation,
    pub weight: f64,
}

/// Append-only arena of thoughts for one search run.
#[derive(Debug, Default)]
pub struct ThoughtGraph {
    nodes: Vec<ThoughtNode>,
    edges: Vec<ThoughtEdge>,
    edge_keys: HashSet<(ThoughtId, ThoughtId, EdgeRelation)>,
}

impl ThoughtGraph {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of thoughts recorded so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a parentless seed thought at depth 0.
    pub fn add_seed(&mut self, content: impl Into<String>) -> ThoughtId {
        let id = ThoughtId(self.nodes.len());
        self.nodes.push(ThoughtNode {
            id,
            content: content.into(),
            depth: 0,
            score: None,
            origin: ThoughtOrigin::Seed,
            state: ThoughtState::Seed,
            parents: Vec::new(),
            children: Vec::new(),
        });
        id
    }

    /// Add a child thought.
    ///
    /// Parents must already exist, which makes the arena acyclic by
    /// construction. Aggregation thoughts require at least two parents.
    /// Depth is the maximum parent depth plus one.
    pub fn add_child(
        &mut self,
        content: impl Into<String>,
        origin: ThoughtOrigin,
        parents: &[ThoughtId],
    ) -> GraphResult<ThoughtId> {
        if parents.is_empty() {
            return Err(GraphError::UnknownParent {
                node_id: format!("t{}", self.nodes.len()),
                parent_id: "(none declared)".to_string(),
            });
        }
        if origin == ThoughtOrigin::Aggregation && parents.len() < 2 {
            return Err(GraphError::AggregationArity { got: parents.len() });
        }
        for parent in parents {
            if parent.0 >= self.nodes.len() {
                return Err(GraphError::UnknownParent {
                    node_id: format!("t{}", self.nodes.len()),
                    parent_id: parent.to_string(),
                });
            }
        }

        let id = ThoughtId(self.nodes.len());
        let depth = parents
            .iter()
            .map(|p| self.nodes[p.0].depth)
            .max()
            .unwrap_or(0)
            + 1;
        self.nodes.push(ThoughtNode {
            id,
            content: content.into(),
            depth,
            score: None,
            origin,
            state: ThoughtState::Generated,
            parents: parents.to_vec(),
            children: Vec::new(),
        });
        for parent in parents {
            self.nodes[parent.0].children.push(id);
        }
        Ok(id)
    }

    /// Add a typed cross-link between two thoughts.
    ///
    /// Rejects self-loops and unknown endpoints; an edge identical in
    /// (source, target, relation) to an existing one is dropped silently.
    pub fn add_edge(
        &mut self,
        source: ThoughtId,
        target: ThoughtId,
        relation: EdgeRelation,
        weight: f64,
    ) -> GraphResult<()> {
        if source == target {
            return Err(GraphError::SelfLoop {
                node_id: source.to_string(),
            });
        }
        for endpoint in [source, target] {
            if endpoint.0 >= self.nodes.len() {
                return Err(GraphError::UnknownEndpoint {
                    node_id: endpoint.to_string(),
                });
            }
        }
        if !self.edge_keys.insert((source, target, relation)) {
            return Ok(());
        }
        self.edges.push(ThoughtEdge {
            source,
            target,
            relation,
            weight: weight.clamp(0.0, 1.0),
        });
        Ok(())
    }

    /// Get a thought by ID.
    pub fn node(&self, id: ThoughtId) -> Option<&ThoughtNode> {
        self.nodes.get(id.0)
    }

    /// All thoughts in creation order.
    pub fn nodes(&self) -> &[ThoughtNode] {
        &self.nodes
    }

    /// All cross-links in creation order.
    pub fn edges(&self) -> &[ThoughtEdge] {
        &self.edges
    }

    /// Set the score of a thought.
    pub fn set_score(&mut self, id: ThoughtId, score: f64) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.score = Some(score.clamp(0.0, 1.0));
        }
    }

    /// Transition a thought to a new lifecycle state.
    pub fn set_state(&mut self, id: ThoughtId, state: ThoughtState) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.state = state;
        }
    }

    /// The earliest-declared parent of a thought.
    pub fn primary_parent(&self, id: ThoughtId) -> Option<ThoughtId> {
        self.nodes.get(id.0).and_then(|n| n.parents.first().copied())
    }

    /// Path from the seed to the given thought, following primary parents
    /// only. Primary-parent links always reach a parentless node, so this
    /// terminates on any arena, including ones with aggregation cross-links.
    pub fn best_path(&self, id: ThoughtId) -> Vec<ThoughtId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            path.push(node_id);
            current = self.primary_parent(node_id);
        }
        path.reverse();
        path
    }

    /// IDs of thoughts at the given depth in the given state.
    pub fn at_depth_in_state(&self, depth: usize, state: ThoughtState) -> Vec<ThoughtId> {
        self.nodes
            .iter()
            .filter(|n| n.depth == depth && n.state == state)
            .map(|n| n.id)
            .collect()
    }

    /// Deepest level recorded so far.
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_seed_has_depth_zero() {
        let mut graph = ThoughtGraph::new();
        let seed = graph.add_seed("problem");
        let node = graph.node(seed).unwrap();
        assert_eq!(node.depth, 0);
        assert_eq!(node.origin, ThoughtOrigin::Seed);
        assert!(node.parents.is_empty());
    }

    #[test]
    fn test_depth_is_max_parent_depth_plus_one() {
        let mut graph = ThoughtGraph::new();
        let seed = graph.add_seed("problem");
        let a = graph
            .add_child("a", ThoughtOrigin::Generation, &[seed])
            .unwrap();
        let b = graph
            .add_child("b", ThoughtOrigin::Generation, &[a])
            .unwrap();
        // Aggregation across depths 1 and 2 lands at depth 3
        let agg = graph
            .add_child("merged", ThoughtOrigin::Aggregation, &[a, b])
            .unwrap();
        assert_eq!(graph.node(a).unwrap().depth, 1);
        assert_eq!(graph.node(b).unwrap().depth, 2);
        assert_eq!(graph.node(agg).unwrap().depth, 3);
    }

    #[test]
    fn test_add_child_unknown_parent() {
        let mut graph = ThoughtGraph::new();
        graph.add_seed("problem");
        let err = graph
            .add_child("x", ThoughtOrigin::Generation, &[ThoughtId(7)])
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownParent { .. }));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_aggregation_requires_two_parents() {
        let mut graph = ThoughtGraph::new();
        let seed = graph.add_seed("problem");
        let err = graph
            .add_child("merged", ThoughtOrigin::Aggregation, &[seed])
            .unwrap_err();
        assert!(matches!(err, GraphError::AggregationArity { got: 1 }));
    }

    #[test]
    fn test_children_recorded_on_all_parents() {
        let mut graph = ThoughtGraph::new();
        let seed = graph.add_seed("problem");
        let a = graph
            .add_child("a", ThoughtOrigin::Generation, &[seed])
            .unwrap();
        let b = graph
            .add_child("b", ThoughtOrigin::Generation, &[seed])
            .unwrap();
        let agg = graph
            .add_child("merged", ThoughtOrigin::Aggregation, &[a, b])
            .unwrap();
        assert_eq!(graph.node(a).unwrap().children, vec![agg]);
        assert_eq!(graph.node(b).unwrap().children, vec![agg]);
    }

    #[test]
    fn test_add_edge_validation_and_dedup() {
        let mut graph = ThoughtGraph::new();
        let seed = graph.add_seed("problem");
        let a = graph
            .add_child("a", ThoughtOrigin::Generation, &[seed])
            .unwrap();

        assert!(matches!(
            graph.add_edge(a, a, EdgeRelation::Supports, 1.0),
            Err(GraphError::SelfLoop { .. })
        ));
        assert!(matches!(
            graph.add_edge(a, ThoughtId(9), EdgeRelation::Supports, 1.0),
            Err(GraphError::UnknownEndpoint { .. })
        ));

        graph.add_edge(seed, a, EdgeRelation::Influences, 1.0).unwrap();
        graph.add_edge(seed, a, EdgeRelation::Influences, 0.5).unwrap();
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_best_path_follows_primary_parent_through_aggregation() {
        let mut graph = ThoughtGraph::new();
        let seed = graph.add_seed("problem");
        let a = graph
            .add_child("a", ThoughtOrigin::Generation, &[seed])
            .unwrap();
        let b = graph
            .add_child("b", ThoughtOrigin::Generation, &[seed])
            .unwrap();
        let agg = graph
            .add_child("merged", ThoughtOrigin::Aggregation, &[a, b])
            .unwrap();
        let leaf = graph
            .add_child("leaf", ThoughtOrigin::Generation, &[agg])
            .unwrap();

        let path = graph.best_path(leaf);
        assert_eq!(path, vec![seed, a, agg, leaf]);
    }

    #[test]
    fn test_set_score_clamps() {
        let mut graph = ThoughtGraph::new();
        let seed = graph.add_seed("problem");
        graph.set_score(seed, 1.7);
        assert_eq!(graph.node(seed).unwrap().score, Some(1.0));
    }

    #[test]
    fn test_at_depth_in_state() {
        let mut graph = ThoughtGraph::new();
        let seed = graph.add_seed("problem");
        let a = graph
            .add_child("a", ThoughtOrigin::Generation, &[seed])
            .unwrap();
        let b = graph
            .add_child("b", ThoughtOrigin::Generation, &[seed])
            .unwrap();
        graph.set_state(a, ThoughtState::Active);
        graph.set_state(b, ThoughtState::Pruned);

        assert_eq!(graph.at_depth_in_state(1, ThoughtState::Active), vec![a]);
        assert_eq!(graph.at_depth_in_state(1, ThoughtState::Pruned), vec![b]);
    }
}
