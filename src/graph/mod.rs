//! Reasoning Graph Store: the persisted entity graph.
//!
//! An append-only, in-process arena of [`ReasoningNode`] entries with typed
//! edges, decision points, and reviewer annotations. Nodes are created once
//! per oracle turn or correction and are immutable afterwards, except for
//! appended annotations. Cycle-freedom is achieved by construction: a node's
//! parent must already exist at insert time, so every parent link points
//! from an earlier-created node to a later-created one and creation order is
//! the implicit topological order. There is no runtime cycle detection.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, GraphResult};
use crate::oracle::TokenUsage;

/// Kind of a persisted reasoning node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// An ordinary reasoning turn.
    #[default]
    Thinking,
    /// A summary node compacting a longer chain.
    Compaction,
    /// One branch of a fork analysis.
    ForkBranch,
    /// A reviewer verdict materialized as a node.
    HumanAnnotation,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Thinking => write!(f, "thinking"),
            NodeKind::Compaction => write!(f, "compaction"),
            NodeKind::ForkBranch => write!(f, "fork_branch"),
            NodeKind::HumanAnnotation => write!(f, "human_annotation"),
        }
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thinking" => Ok(NodeKind::Thinking),
            "compaction" => Ok(NodeKind::Compaction),
            "fork_branch" => Ok(NodeKind::ForkBranch),
            "human_annotation" => Ok(NodeKind::HumanAnnotation),
            _ => Err(format!("Unknown node kind: {}", s)),
        }
    }
}

/// Typed relation carried by a graph edge.
///
/// Shared by the persisted store and the in-engine thought graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRelation {
    /// Source influenced the target.
    #[default]
    Influences,
    /// Source contradicts the target's conclusion.
    Contradicts,
    /// Source supports the target's conclusion.
    Supports,
    /// Source supersedes the target.
    Supersedes,
    /// Source refines or improves the target.
    Refines,
}

impl std::fmt::Display for EdgeRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeRelation::Influences => write!(f, "influences"),
            EdgeRelation::Contradicts => write!(f, "contradicts"),
            EdgeRelation::Supports => write!(f, "supports"),
            EdgeRelation::Supersedes => write!(f, "supersedes"),
            EdgeRelation::Refines => write!(f, "refines"),
        }
    }
}

impl std::str::FromStr for EdgeRelation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "influences" => Ok(EdgeRelation::Influences),
            "contradicts" => Ok(EdgeRelation::Contradicts),
            "supports" => Ok(EdgeRelation::Supports),
            "supersedes" => Ok(EdgeRelation::Supersedes),
            "refines" => Ok(EdgeRelation::Refines),
            _ => Err(format!("Unknown edge relation: {}", s)),
        }
    }
}

/// Reviewer verdict attached to an existing reasoning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The reviewer confirms the node; confidence forced to 1.0.
    Verified,
    /// The reviewer is unsure; confidence forced to 0.5.
    Questionable,
    /// The reviewer disagrees; confidence forced to 0.0, correction required.
    Disagree,
}

impl Verdict {
    /// Confidence forced onto the annotation node for this verdict.
    pub fn confidence(&self) -> f64 {
        match self {
            Verdict::Verified => 1.0,
            Verdict::Questionable => 0.5,
            Verdict::Disagree => 0.0,
        }
    }

    /// Edge relation linking the annotation node to its target.
    pub fn edge_relation(&self) -> EdgeRelation {
        match self {
            Verdict::Verified => EdgeRelation::Supports,
            Verdict::Questionable => EdgeRelation::Refines,
            Verdict::Disagree => EdgeRelation::Contradicts,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Verified => write!(f, "verified"),
            Verdict::Questionable => write!(f, "questionable"),
            Verdict::Disagree => write!(f, "disagree"),
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "verified" => Ok(Verdict::Verified),
            "questionable" => Ok(Verdict::Questionable),
            "disagree" => Ok(Verdict::Disagree),
            _ => Err(format!("Unknown verdict: {}", s)),
        }
    }
}

/// Reviewer verdict record appended to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointAnnotation {
    /// Unique annotation identifier.
    pub id: String,
    /// The reviewer's verdict.
    pub verdict: Verdict,
    /// Correction text; required for a disagree verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    /// When the verdict was attached.
    pub created_at: DateTime<Utc>,
}

impl CheckpointAnnotation {
    /// Create a new annotation with the given verdict.
    pub fn new(verdict: Verdict) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            verdict,
            correction: None,
            created_at: Utc::now(),
        }
    }

    /// Set the correction text.
    pub fn with_correction(mut self, correction: impl Into<String>) -> Self {
        self.correction = Some(correction.into());
        self
    }
}

/// One structured step inside a reasoning node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// What this step does.
    pub description: String,
    /// Conclusion reached by the step, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
}

impl ReasoningStep {
    /// Create a new step.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            conclusion: None,
        }
    }

    /// Set the conclusion.
    pub fn with_conclusion(mut self, conclusion: impl Into<String>) -> Self {
        self.conclusion = Some(conclusion.into());
        self
    }
}

/// A persisted reasoning node, created once per oracle turn or correction.
///
/// Immutable after insertion except for appended annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningNode {
    /// Unique node identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Parent node for lineage; parents must already exist at insert time.
    pub parent_id: Option<String>,
    /// The reasoning text.
    pub reasoning: String,
    /// Structured step list.
    #[serde(default)]
    pub steps: Vec<ReasoningStep>,
    /// Confidence in this node (0.0-1.0).
    pub confidence: f64,
    /// Token accounting for the oracle turn that produced it.
    pub tokens: TokenUsage,
    /// Kind of node.
    pub kind: NodeKind,
    /// Reviewer annotations, appended after creation.
    #[serde(default)]
    pub annotations: Vec<CheckpointAnnotation>,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// Optional metadata.
    pub metadata: Option<serde_json::Value>,
}

impl ReasoningNode {
    /// Create a new reasoning node
    pub fn new(session_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            parent_id: None,
            reasoning: reasoning.into(),
            steps: Vec::new(),
            confidence: 0.8,
            tokens: TokenUsage::default(),
            kind: NodeKind::Thinking,
            annotations: Vec::new(),
            created_at: Utc::now(),
            metadata: None,
        }
    }

    /// Set the parent node
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the confidence level
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the node kind
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the structured step list
    pub fn with_steps(mut self, steps: Vec<ReasoningStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Set token accounting
    pub fn with_tokens(mut self, tokens: TokenUsage) -> Self {
        self.tokens = tokens;
        self
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Directed typed edge between two reasoning nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningEdge {
    /// Unique edge identifier.
    pub id: String,
    /// Source node ID.
    pub source: String,
    /// Target node ID.
    pub target: String,
    /// Relation carried by the edge.
    pub relation: EdgeRelation,
    /// Edge weight (0.0-1.0).
    pub weight: f64,
    /// When the edge was created.
    pub created_at: DateTime<Utc>,
}

impl ReasoningEdge {
    /// Create a new edge
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: EdgeRelation,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            target: target.into(),
            relation,
            weight: 1.0,
            created_at: Utc::now(),
        }
    }

    /// Set the weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }
}

/// An alternative the reasoning considered and rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedAlternative {
    /// The rejected path.
    pub path: String,
    /// Why it was rejected.
    pub reason: String,
}

/// A decision recorded inside one reasoning node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPoint {
    /// Unique decision identifier.
    pub id: String,
    /// The node that owns this decision.
    pub node_id: String,
    /// The path that was chosen.
    pub chosen_path: String,
    /// Alternatives with rejection reasons.
    pub alternatives: Vec<RejectedAlternative>,
    /// Confidence in the choice (0.0-1.0).
    pub confidence: f64,
    /// Excerpt of the reasoning that motivated the decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl DecisionPoint {
    /// Create a new decision point owned by a node
    pub fn new(node_id: impl Into<String>, chosen_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_id: node_id.into(),
            chosen_path: chosen_path.into(),
            alternatives: Vec::new(),
            confidence: 0.8,
            excerpt: None,
        }
    }

    /// Add a rejected alternative
    pub fn with_alternative(mut self, path: impl Into<String>, reason: impl Into<String>) -> Self {
        self.alternatives.push(RejectedAlternative {
            path: path.into(),
            reason: reason.into(),
        });
        self
    }

    /// Set the confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the motivating excerpt
    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }
}

/// Append-only arena of reasoning nodes, edges, and decision points.
#[derive(Debug, Default)]
pub struct ReasoningGraph {
    nodes: Vec<ReasoningNode>,
    index: HashMap<String, usize>,
    edges: Vec<ReasoningEdge>,
    edge_keys: HashSet<(String, String, EdgeRelation)>,
    decision_points: Vec<DecisionPoint>,
}

impl ReasoningGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node.
    ///
    /// Rejects a node whose declared parent is unknown. Insertion is
    /// idempotent by id: re-inserting an existing id is a no-op, so retried
    /// writes after a transient failure are safe.
    pub fn insert_node(&mut self, node: ReasoningNode) -> GraphResult<()> {
        if self.index.contains_key(&node.id) {
            return Ok(());
        }
        if let Some(parent_id) = &node.parent_id {
            if !self.index.contains_key(parent_id) {
                return Err(GraphError::UnknownParent {
                    node_id: node.id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Insert an edge.
    ///
    /// Rejects self-loops and unknown endpoints. An edge identical in
    /// (source, target, relation) to an existing one is dropped silently.
    pub fn insert_edge(&mut self, edge: ReasoningEdge) -> GraphResult<()> {
        if edge.source == edge.target {
            return Err(GraphError::SelfLoop {
                node_id: edge.source.clone(),
            });
        }
        for endpoint in [&edge.source, &edge.target] {
            if !self.index.contains_key(endpoint) {
                return Err(GraphError::UnknownEndpoint {
                    node_id: endpoint.clone(),
                });
            }
        }
        let key = (edge.source.clone(), edge.target.clone(), edge.relation);
        if !self.edge_keys.insert(key) {
            return Ok(());
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Attach a decision point to its owning node.
    pub fn attach_decision_point(&mut self, decision: DecisionPoint) -> GraphResult<()> {
        if !self.index.contains_key(&decision.node_id) {
            return Err(GraphError::NodeNotFound {
                node_id: decision.node_id.clone(),
            });
        }
        self.decision_points.push(decision);
        Ok(())
    }

    /// Append a reviewer annotation to an existing node.
    ///
    /// This is the only permitted mutation of a persisted node.
    pub fn append_annotation(
        &mut self,
        node_id: &str,
        annotation: CheckpointAnnotation,
    ) -> GraphResult<()> {
        let idx = *self
            .index
            .get(node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
        self.nodes[idx].annotations.push(annotation);
        Ok(())
    }

    /// Get a node by ID.
    pub fn node(&self, id: &str) -> Option<&ReasoningNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> &[ReasoningNode] {
        &self.nodes
    }

    /// All edges in creation order.
    pub fn edges(&self) -> &[ReasoningEdge] {
        &self.edges
    }

    /// Decision points owned by a node.
    pub fn decision_points_for(&self, node_id: &str) -> Vec<&DecisionPoint> {
        self.decision_points
            .iter()
            .filter(|dp| dp.node_id == node_id)
            .collect()
    }

    /// Single lineage from a node back to its root, following parent links
    /// only. Returns the node first and the root last, bounding context size
    /// for prompt construction.
    pub fn ancestor_chain(&self, id: &str) -> GraphResult<Vec<&ReasoningNode>> {
        let mut current = self.node(id).ok_or_else(|| GraphError::NodeNotFound {
            node_id: id.to_string(),
        })?;
        let mut chain = vec![current];
        while let Some(parent_id) = &current.parent_id {
            // Parents are validated at insert time, so this lookup holds.
            match self.node(parent_id) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => break,
            }
        }
        Ok(chain)
    }

    /// Nodes reachable within `hops` steps of the given node, traversing
    /// typed edges and parent links in both directions. The start node is
    /// excluded.
    pub fn related(&self, id: &str, hops: usize) -> GraphResult<Vec<&ReasoningNode>> {
        if !self.index.contains_key(id) {
            return Err(GraphError::NodeNotFound {
                node_id: id.to_string(),
            });
        }

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
            adjacency
                .entry(edge.target.as_str())
                .or_default()
                .push(edge.source.as_str());
        }
        for node in &self.nodes {
            if let Some(parent_id) = &node.parent_id {
                adjacency
                    .entry(node.id.as_str())
                    .or_default()
                    .push(parent_id.as_str());
                adjacency
                    .entry(parent_id.as_str())
                    .or_default()
                    .push(node.id.as_str());
            }
        }

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        queue.push_back((id, 0));
        let mut found: Vec<&str> = Vec::new();

        while let Some((node_id, distance)) = queue.pop_front() {
            if distance >= hops {
                continue;
            }
            if let Some(neighbors) = adjacency.get(node_id) {
                for &neighbor in neighbors {
                    if visited.insert(neighbor) {
                        found.push(neighbor);
                        queue.push_back((neighbor, distance + 1));
                    }
                }
            }
        }

        // Creation order keeps the result deterministic
        let mut related: Vec<&ReasoningNode> = found
            .into_iter()
            .filter_map(|node_id| self.node(node_id))
            .collect();
        related.sort_by_key(|n| self.index[&n.id]);
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(session: &str, text: &str) -> ReasoningNode {
        ReasoningNode::new(session, text)
    }

    #[test]
    fn test_insert_node_unknown_parent_rejected() {
        let mut graph = ReasoningGraph::new();
        let orphan = node("s1", "child").with_parent("no-such-node");
        let err = graph.insert_node(orphan).unwrap_err();
        assert!(matches!(err, GraphError::UnknownParent { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_insert_node_idempotent_by_id() {
        let mut graph = ReasoningGraph::new();
        let n = node("s1", "root");
        graph.insert_node(n.clone()).unwrap();
        graph.insert_node(n).unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_insert_edge_rejects_self_loop() {
        let mut graph = ReasoningGraph::new();
        let n = node("s1", "root");
        let id = n.id.clone();
        graph.insert_node(n).unwrap();
        let err = graph
            .insert_edge(ReasoningEdge::new(&id, &id, EdgeRelation::Supports))
            .unwrap_err();
        assert!(matches!(err, GraphError::SelfLoop { .. }));
    }

    #[test]
    fn test_insert_edge_rejects_unknown_endpoint() {
        let mut graph = ReasoningGraph::new();
        let n = node("s1", "root");
        let id = n.id.clone();
        graph.insert_node(n).unwrap();
        let err = graph
            .insert_edge(ReasoningEdge::new(&id, "ghost", EdgeRelation::Supports))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownEndpoint { .. }));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_insert_edge_deduplicates() {
        let mut graph = ReasoningGraph::new();
        let a = node("s1", "a");
        let b = node("s1", "b");
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        graph.insert_node(a).unwrap();
        graph.insert_node(b).unwrap();

        graph
            .insert_edge(ReasoningEdge::new(&a_id, &b_id, EdgeRelation::Supports))
            .unwrap();
        graph
            .insert_edge(ReasoningEdge::new(&a_id, &b_id, EdgeRelation::Supports))
            .unwrap();
        assert_eq!(graph.edges().len(), 1);

        // Different relation between the same endpoints is a distinct edge
        graph
            .insert_edge(ReasoningEdge::new(&a_id, &b_id, EdgeRelation::Refines))
            .unwrap();
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_ancestor_chain_follows_single_lineage() {
        let mut graph = ReasoningGraph::new();
        let root = node("s1", "root");
        let mid = node("s1", "mid").with_parent(&root.id);
        let leaf = node("s1", "leaf").with_parent(&mid.id);
        let leaf_id = leaf.id.clone();
        graph.insert_node(root).unwrap();
        graph.insert_node(mid).unwrap();
        graph.insert_node(leaf).unwrap();

        let chain = graph.ancestor_chain(&leaf_id).unwrap();
        let texts: Vec<&str> = chain.iter().map(|n| n.reasoning.as_str()).collect();
        assert_eq!(texts, vec!["leaf", "mid", "root"]);
    }

    #[test]
    fn test_ancestor_chain_unknown_node() {
        let graph = ReasoningGraph::new();
        assert!(matches!(
            graph.ancestor_chain("missing"),
            Err(GraphError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_related_respects_hop_bound() {
        let mut graph = ReasoningGraph::new();
        let a = node("s1", "a");
        let b = node("s1", "b").with_parent(&a.id);
        let c = node("s1", "c").with_parent(&b.id);
        let d = node("s1", "d").with_parent(&c.id);
        let (a_id, ids) = (
            a.id.clone(),
            [b.id.clone(), c.id.clone(), d.id.clone()],
        );
        for n in [a, b, c, d] {
            graph.insert_node(n).unwrap();
        }

        let one_hop = graph.related(&a_id, 1).unwrap();
        assert_eq!(one_hop.len(), 1);
        assert_eq!(one_hop[0].id, ids[0]);

        let two_hops = graph.related(&a_id, 2).unwrap();
        assert_eq!(two_hops.len(), 2);

        let all = graph.related(&a_id, 10).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_related_traverses_typed_edges() {
        let mut graph = ReasoningGraph::new();
        let a = node("s1", "a");
        let b = node("s1", "b");
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        graph.insert_node(a).unwrap();
        graph.insert_node(b).unwrap();
        graph
            .insert_edge(ReasoningEdge::new(&b_id, &a_id, EdgeRelation::Contradicts))
            .unwrap();

        // Edge direction does not matter for neighborhood traversal
        let related = graph.related(&a_id, 1).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, b_id);
    }

    #[test]
    fn test_append_annotation_only_mutation() {
        let mut graph = ReasoningGraph::new();
        let n = node("s1", "root");
        let id = n.id.clone();
        graph.insert_node(n).unwrap();

        graph
            .append_annotation(&id, CheckpointAnnotation::new(Verdict::Verified))
            .unwrap();
        graph
            .append_annotation(&id, CheckpointAnnotation::new(Verdict::Questionable))
            .unwrap();

        let stored = graph.node(&id).unwrap();
        assert_eq!(stored.annotations.len(), 2);
        assert_eq!(stored.annotations[0].verdict, Verdict::Verified);
        assert_eq!(stored.reasoning, "root");
    }

    #[test]
    fn test_attach_decision_point_unknown_owner() {
        let mut graph = ReasoningGraph::new();
        let dp = DecisionPoint::new("ghost", "take the left path");
        assert!(matches!(
            graph.attach_decision_point(dp),
            Err(GraphError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_decision_point_builder() {
        let mut graph = ReasoningGraph::new();
        let n = node("s1", "root");
        let id = n.id.clone();
        graph.insert_node(n).unwrap();

        let dp = DecisionPoint::new(&id, "use a queue")
            .with_alternative("use a stack", "loses FIFO ordering")
            .with_confidence(0.9)
            .with_excerpt("ordering matters here");
        graph.attach_decision_point(dp).unwrap();

        let points = graph.decision_points_for(&id);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].alternatives.len(), 1);
        assert_eq!(points[0].confidence, 0.9);
    }

    #[test]
    fn test_verdict_forced_confidence_and_relation() {
        assert_eq!(Verdict::Verified.confidence(), 1.0);
        assert_eq!(Verdict::Questionable.confidence(), 0.5);
        assert_eq!(Verdict::Disagree.confidence(), 0.0);
        assert_eq!(Verdict::Verified.edge_relation(), EdgeRelation::Supports);
        assert_eq!(Verdict::Questionable.edge_relation(), EdgeRelation::Refines);
        assert_eq!(Verdict::Disagree.edge_relation(), EdgeRelation::Contradicts);
    }

    #[test]
    fn test_node_kind_round_trip() {
        for kind in [
            NodeKind::Thinking,
            NodeKind::Compaction,
            NodeKind::ForkBranch,
            NodeKind::HumanAnnotation,
        ] {
            let parsed: NodeKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_edge_relation_round_trip() {
        for relation in [
            EdgeRelation::Influences,
            EdgeRelation::Contradicts,
            EdgeRelation::Supports,
            EdgeRelation::Supersedes,
            EdgeRelation::Refines,
        ] {
            let parsed: EdgeRelation = relation.to_string().parse().unwrap();
            assert_eq!(parsed, relation);
        }
    }

    #[test]
    fn test_compaction_node_kind() {
        let mut graph = ReasoningGraph::new();
        let root = node("s1", "long chain start");
        let summary = node("s1", "chain summary")
            .with_parent(&root.id)
            .with_kind(NodeKind::Compaction);
        let summary_id = summary.id.clone();
        graph.insert_node(root).unwrap();
        graph.insert_node(summary).unwrap();
        assert_eq!(graph.node(&summary_id).unwrap().kind, NodeKind::Compaction);
    }
}
