//! Thought Search Engine: Graph-of-Thoughts exploration over the oracle.
//!
//! One run grows a [`ThoughtGraph`] from a seed problem statement by
//! repeatedly asking the oracle for candidate continuations, scoring them,
//! pruning weak ones, and optionally merging similar thoughts or refining
//! promising-but-flawed ones. Three strategies decide expansion order.
//! Oracle failures are contained: a failed call marks one thought `Failed`
//! and the run continues degraded.

mod events;
mod graph;

pub use events::{EventSink, SearchEvent};
pub use graph::{
    ThoughtEdge, ThoughtGraph, ThoughtId, ThoughtNode, ThoughtOrigin, ThoughtState,
};

use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::SearchDefaults;
use crate::error::{AppError, AppResult, OracleResult};
use crate::graph::EdgeRelation;
use crate::oracle::{extract_json, Effort, Generation, Oracle, TokenUsage};
use crate::prompts::{
    AGGREGATE_THOUGHTS_PROMPT, GENERATE_THOUGHTS_PROMPT, REFINE_THOUGHT_PROMPT,
};

/// Expansion-order strategy for a search run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Expand every active thought at depth d before any at d+1.
    #[default]
    BreadthFirst,
    /// Follow the most promising child of the last expansion; backtrack on
    /// exhaustion or failure.
    DepthFirst,
    /// Always expand the highest-scored unexpanded thought, regardless of
    /// depth.
    BestFirst,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::BreadthFirst => write!(f, "breadth_first"),
            SearchStrategy::DepthFirst => write!(f, "depth_first"),
            SearchStrategy::BestFirst => write!(f, "best_first"),
        }
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "breadth_first" | "bfs" => Ok(SearchStrategy::BreadthFirst),
            "depth_first" | "dfs" => Ok(SearchStrategy::DepthFirst),
            "best_first" => Ok(SearchStrategy::BestFirst),
            _ => Err(format!("Unknown search strategy: {}", s)),
        }
    }
}

/// Knobs for one search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub strategy: SearchStrategy,
    /// Candidates requested per expansion; also bounds frontier width and
    /// concurrent generation calls.
    pub branching_factor: usize,
    pub max_depth: usize,
    pub max_thoughts: usize,
    /// Scores below this are pruned (kept for audit, never expanded).
    pub prune_threshold: f64,
    pub enable_aggregation: bool,
    pub enable_refinement: bool,
    /// Score debit applied to an aggregation node built without re-scoring.
    pub aggregation_penalty: f64,
    /// Spend one extra oracle call to score each aggregation node.
    pub rescore_aggregations: bool,
    /// Token-Jaccard similarity at or above which thoughts are merged.
    pub similarity_threshold: f64,
    /// Scores in [prune_threshold, refine_ceiling) count as promising but
    /// flawed and are eligible for refinement.
    pub refine_ceiling: f64,
    /// How many top thoughts the report highlights.
    pub best_count: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        let defaults = SearchDefaults::default();
        Self {
            strategy: SearchStrategy::default(),
            branching_factor: defaults.branching_factor,
            max_depth: defaults.max_depth,
            max_thoughts: defaults.max_thoughts,
            prune_threshold: defaults.prune_threshold,
            enable_aggregation: true,
            enable_refinement: true,
            aggregation_penalty: defaults.aggregation_penalty,
            rescore_aggregations: false,
            similarity_threshold: 0.6,
            refine_ceiling: 0.6,
            best_count: 3,
        }
    }
}

impl SearchOptions {
    /// Options for the given strategy, everything else at defaults
    pub fn with_strategy(strategy: SearchStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Set the branching factor
    pub fn with_branching_factor(mut self, branching_factor: usize) -> Self {
        self.branching_factor = branching_factor;
        self
    }

    /// Set the depth budget
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the node budget
    pub fn with_max_thoughts(mut self, max_thoughts: usize) -> Self {
        self.max_thoughts = max_thoughts;
        self
    }

    /// Set the prune threshold
    pub fn with_prune_threshold(mut self, prune_threshold: f64) -> Self {
        self.prune_threshold = prune_threshold;
        self
    }

    /// Enable or disable aggregation
    pub fn with_aggregation(mut self, enabled: bool) -> Self {
        self.enable_aggregation = enabled;
        self
    }

    /// Enable or disable refinement
    pub fn with_refinement(mut self, enabled: bool) -> Self {
        self.enable_refinement = enabled;
        self
    }

    /// Validate the options before anything is recorded.
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=10).contains(&self.branching_factor) {
            return Err(AppError::Validation {
                field: "branching_factor".to_string(),
                reason: "must be between 1 and 10".to_string(),
            });
        }
        if self.max_depth == 0 {
            return Err(AppError::Validation {
                field: "max_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_thoughts == 0 {
            return Err(AppError::Validation {
                field: "max_thoughts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.best_count == 0 {
            return Err(AppError::Validation {
                field: "best_count".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [
            ("prune_threshold", self.prune_threshold),
            ("aggregation_penalty", self.aggregation_penalty),
            ("similarity_threshold", self.similarity_threshold),
            ("refine_ceiling", self.refine_ceiling),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Validation {
                    field: field.to_string(),
                    reason: "must be between 0.0 and 1.0".to_string(),
                });
            }
        }
        if self.refine_ceiling < self.prune_threshold {
            return Err(AppError::Validation {
                field: "refine_ceiling".to_string(),
                reason: "must not be below prune_threshold".to_string(),
            });
        }
        Ok(())
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    MaxThoughts,
    MaxDepth,
    FrontierExhausted,
    TerminalThought,
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    pub total_thoughts: usize,
    pub thoughts_explored: usize,
    pub thoughts_pruned: usize,
    pub aggregations_made: usize,
    pub refinements_made: usize,
    pub max_depth_reached: usize,
    pub total_tokens: TokenUsage,
    pub total_duration_ms: u64,
    pub generation_errors: usize,
    pub evaluation_errors: usize,
}

/// Full exploration record included in the report.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub thoughts: Vec<ThoughtNode>,
    pub edges: Vec<ThoughtEdge>,
    pub best_thoughts: Vec<ThoughtId>,
}

/// Result of one search run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub answer: String,
    pub confidence: f64,
    pub reasoning_summary: String,
    pub stats: SearchStats,
    pub graph: GraphSnapshot,
    pub termination: Termination,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

/// Candidate continuations embedded in a generation completion
#[derive(Debug, Clone, Deserialize)]
struct ContinuationsPayload {
    continuations: Vec<ContinuationPayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContinuationPayload {
    content: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    terminal: bool,
}

/// Payload shared by aggregation and refinement completions
#[derive(Debug, Clone, Deserialize)]
struct SynthesisPayload {
    content: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Token-level Jaccard similarity between two texts.
pub(crate) fn token_jaccard(a: &str, b: &str) -> f64 {
    let tokenize = |s: &str| -> HashSet<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    };
    let set_a = tokenize(a);
    let set_b = tokenize(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

/// Heap entry for best-first expansion: score descending, ties broken by
/// lower depth, then earlier creation.
#[derive(Debug, PartialEq)]
struct Frontier {
    score: f64,
    depth: usize,
    id: ThoughtId,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| other.depth.cmp(&self.depth))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Graph-of-Thoughts search over an oracle.
pub struct ThoughtSearchEngine<O: Oracle + 'static> {
    oracle: Arc<O>,
}

impl<O: Oracle + 'static> ThoughtSearchEngine<O> {
    /// Create a new engine over the given oracle
    pub fn new(oracle: Arc<O>) -> Self {
        Self { oracle }
    }

    /// Run a search for the given problem.
    ///
    /// All exploration state lives in the run's thought graph, so dropping
    /// the returned future abandons in-flight oracle calls and loses nothing
    /// already recorded. No timeout is imposed here; elapsed time lands in
    /// the stats for an external watchdog.
    pub async fn run(
        &self,
        problem: &str,
        options: SearchOptions,
        events: Option<UnboundedSender<SearchEvent>>,
    ) -> AppResult<SearchReport> {
        options.validate()?;
        if problem.trim().is_empty() {
            return Err(AppError::Validation {
                field: "problem".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        info!(
            strategy = %options.strategy,
            branching_factor = options.branching_factor,
            max_depth = options.max_depth,
            max_thoughts = options.max_thoughts,
            "Starting thought search"
        );

        let mut run = SearchRun {
            oracle: Arc::clone(&self.oracle),
            problem: problem.to_string(),
            options,
            graph: ThoughtGraph::new(),
            stats: SearchStats::default(),
            events: EventSink::new(events),
            terminal: None,
            terminal_hints: HashSet::new(),
            started: Instant::now(),
        };

        let seed = run.graph.add_seed(problem);
        let termination = match run.options.strategy {
            SearchStrategy::BreadthFirst => run.breadth_first(seed).await,
            SearchStrategy::DepthFirst => run.depth_first(seed).await,
            SearchStrategy::BestFirst => run.best_first(seed).await,
        };

        run.finish(termination)
    }
}

/// Mutable state for one run.
struct SearchRun<O: Oracle + 'static> {
    oracle: Arc<O>,
    problem: String,
    options: SearchOptions,
    graph: ThoughtGraph,
    stats: SearchStats,
    events: EventSink,
    terminal: Option<ThoughtId>,
    terminal_hints: HashSet<ThoughtId>,
    started: Instant,
}

impl<O: Oracle + 'static> SearchRun<O> {
    async fn breadth_first(&mut self, seed: ThoughtId) -> Termination {
        let mut frontier = vec![seed];

        for depth in 1..=self.options.max_depth {
            self.events.emit(SearchEvent::DepthStart { depth });

            let fresh = self.expand_many(&frontier).await;
            let mut active = Vec::new();
            for id in fresh {
                if let Some(survivor) = self.classify(id).await {
                    active.push(survivor);
                }
                if self.terminal.is_some() {
                    return Termination::TerminalThought;
                }
            }

            let mut active = self.aggregate_cohort(active).await;
            self.events.emit(SearchEvent::Progress {
                thoughts: self.graph.len(),
                max_thoughts: self.options.max_thoughts,
            });

            if self.graph.len() >= self.options.max_thoughts {
                return Termination::MaxThoughts;
            }
            if active.is_empty() {
                return Termination::FrontierExhausted;
            }

            // Frontier width is capped; the overflow is discarded, not pruned,
            // so the distinction between low-quality and out-of-budget survives
            // in the record.
            active.sort_by(|a, b| {
                let score = |id: &ThoughtId| {
                    self.graph.node(*id).and_then(|n| n.score).unwrap_or(0.0)
                };
                score(b)
                    .partial_cmp(&score(a))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for dropped in active.split_off(self.options.branching_factor.min(active.len())) {
                self.graph.set_state(dropped, ThoughtState::Discarded);
            }
            frontier = active;
        }

        Termination::MaxDepth
    }

    async fn depth_first(&mut self, seed: ThoughtId) -> Termination {
        let mut stack = vec![seed];
        let mut expanded: HashSet<ThoughtId> = HashSet::new();
        let mut depth_limited = false;

        while let Some(&top) = stack.last() {
            if self.graph.len() >= self.options.max_thoughts {
                return Termination::MaxThoughts;
            }

            if !expanded.contains(&top) {
                let depth = match self.graph.node(top) {
                    Some(node) => node.depth,
                    None => {
                        stack.pop();
                        continue;
                    }
                };
                if depth >= self.options.max_depth {
                    depth_limited = true;
                    stack.pop();
                    continue;
                }

                expanded.insert(top);
                self.events.emit(SearchEvent::DepthStart { depth: depth + 1 });
                let fresh = self.expand_many(&[top]).await;
                for id in fresh {
                    self.classify(id).await;
                    if self.terminal.is_some() {
                        return Termination::TerminalThought;
                    }
                }
                self.events.emit(SearchEvent::Progress {
                    thoughts: self.graph.len(),
                    max_thoughts: self.options.max_thoughts,
                });
            }

            // Descend into the most promising unexpanded active child,
            // backtrack when none remains.
            let children = self
                .graph
                .node(top)
                .map(|n| n.children.clone())
                .unwrap_or_default();
            let next = children
                .into_iter()
                .filter(|c| !expanded.contains(c))
                .filter(|c| {
                    self.graph
                        .node(*c)
                        .map_or(false, |n| n.state == ThoughtState::Active)
                })
                .max_by(|a, b| {
                    let score = |id: ThoughtId| {
                        self.graph.node(id).and_then(|n| n.score).unwrap_or(0.0)
                    };
                    score(*a)
                        .partial_cmp(&score(*b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

            match next {
                Some(child) => stack.push(child),
                None => {
                    stack.pop();
                }
            }
        }

        if depth_limited {
            Termination::MaxDepth
        } else {
            Termination::FrontierExhausted
        }
    }

    async fn best_first(&mut self, seed: ThoughtId) -> Termination {
        let mut heap = BinaryHeap::new();
        heap.push(Frontier {
            score: 1.0,
            depth: 0,
            id: seed,
        });
        let mut depth_limited = false;

        while let Some(entry) = heap.pop() {
            if self.graph.len() >= self.options.max_thoughts {
                return Termination::MaxThoughts;
            }

            let (state, depth) = match self.graph.node(entry.id) {
                Some(node) => (node.state, node.depth),
                None => continue,
            };
            // A pruned thought is never expanded, no matter its position in
            // the queue at the time it was pushed.
            if state != ThoughtState::Active && state != ThoughtState::Seed {
                continue;
            }
            if depth >= self.options.max_depth {
                depth_limited = true;
                continue;
            }

            self.events.emit(SearchEvent::DepthStart { depth: depth + 1 });
            let fresh = self.expand_many(&[entry.id]).await;
            for id in fresh {
                if let Some(survivor) = self.classify(id).await {
                    if let Some(node) = self.graph.node(survivor) {
                        heap.push(Frontier {
                            score: node.score.unwrap_or(0.0),
                            depth: node.depth,
                            id: survivor,
                        });
                    }
                }
                if self.terminal.is_some() {
                    return Termination::TerminalThought;
                }
            }
            self.events.emit(SearchEvent::Progress {
                thoughts: self.graph.len(),
                max_thoughts: self.options.max_thoughts,
            });
        }

        if depth_limited {
            Termination::MaxDepth
        } else {
            Termination::FrontierExhausted
        }
    }

    /// Fan generation out over the frontier.
    ///
    /// The frontier is never wider than the branching factor, so spawning
    /// every task keeps at most that many oracle calls in flight. Only the
    /// collection loop below touches the graph.
    async fn expand_many(&mut self, frontier: &[ThoughtId]) -> Vec<ThoughtId> {
        let mut set: JoinSet<(ThoughtId, OracleResult<Generation>)> = JoinSet::new();
        for &id in frontier {
            let prompt = self.generation_prompt(id);
            let oracle = Arc::clone(&self.oracle);
            self.stats.thoughts_explored += 1;
            set.spawn(async move { (id, oracle.generate(&prompt, Effort::Medium).await) });
        }

        let mut fresh = Vec::new();
        while let Some(joined) = set.join_next().await {
            let Ok((parent, result)) = joined else {
                continue;
            };
            match result {
                Ok(generation) => {
                    self.stats.total_tokens.add(&generation.usage);
                    for candidate in self.parse_continuations(&generation) {
                        // The budget is a hard cap on recorded thoughts, not
                        // just a per-iteration check.
                        if self.graph.len() >= self.options.max_thoughts {
                            break;
                        }
                        match self.graph.add_child(
                            candidate.content,
                            ThoughtOrigin::Generation,
                            &[parent],
                        ) {
                            Ok(id) => {
                                if candidate.terminal {
                                    self.terminal_hints.insert(id);
                                }
                                if let Some(node) = self.graph.node(id) {
                                    self.events.emit(SearchEvent::ThoughtGenerated {
                                        id,
                                        depth: node.depth,
                                        content: node.content.clone(),
                                    });
                                }
                                fresh.push(id);
                            }
                            Err(e) => warn!(error = %e, "Dropping malformed candidate"),
                        }
                    }
                }
                Err(e) => {
                    // An already-scored thought keeps its state and stays a
                    // valid answer candidate; only an unscored source (the
                    // seed) is marked failed.
                    if self.graph.node(parent).map_or(false, |n| n.score.is_none()) {
                        self.graph.set_state(parent, ThoughtState::Failed);
                    }
                    self.stats.generation_errors += 1;
                    self.events.emit(SearchEvent::GenerationFailed {
                        id: parent,
                        error: e.to_string(),
                    });
                    warn!(thought = %parent, error = %e, "Generation failed, continuing");
                }
            }
        }
        fresh
    }

    /// Score one generated thought and route it through prune / refine /
    /// activate. Returns the surviving active thought, which is the
    /// refinement node when a rewrite happened.
    async fn classify(&mut self, id: ThoughtId) -> Option<ThoughtId> {
        let content = self.graph.node(id)?.content.clone();

        let score = match self.oracle.score(&content).await {
            Ok(score) => score,
            Err(e) => {
                self.graph.set_state(id, ThoughtState::Failed);
                self.stats.evaluation_errors += 1;
                self.events.emit(SearchEvent::EvaluationFailed {
                    id,
                    error: e.to_string(),
                });
                warn!(thought = %id, error = %e, "Scoring failed, continuing");
                return None;
            }
        };

        self.graph.set_score(id, score);
        self.graph.set_state(id, ThoughtState::Scored);
        self.events.emit(SearchEvent::ThoughtScored { id, score });

        if self.terminal_hints.contains(&id) {
            self.graph.set_state(id, ThoughtState::Selected);
            self.terminal = Some(id);
            return None;
        }

        if score < self.options.prune_threshold {
            self.graph.set_state(id, ThoughtState::Pruned);
            self.stats.thoughts_pruned += 1;
            debug!(thought = %id, score, "Pruned below threshold");
            return None;
        }

        if self.options.enable_refinement && score < self.options.refine_ceiling {
            if let Some(refined) = self.refine(id, score).await {
                return Some(refined);
            }
        }

        self.graph.set_state(id, ThoughtState::Active);
        Some(id)
    }

    /// Rewrite a promising-but-flawed thought into a new node. The original
    /// is never mutated; it stays in the graph as a `Refined` side branch.
    async fn refine(&mut self, id: ThoughtId, original_score: f64) -> Option<ThoughtId> {
        let content = self.graph.node(id)?.content.clone();
        let prompt = format!(
            "{}\n\nProblem:\n{}\n\nThought to refine:\n{}",
            REFINE_THOUGHT_PROMPT, self.problem, content
        );

        match self.oracle.generate(&prompt, Effort::Medium).await {
            Ok(generation) => {
                self.stats.total_tokens.add(&generation.usage);
                let payload = self.parse_synthesis(&generation);
                let refined = self
                    .graph
                    .add_child(payload.content, ThoughtOrigin::Refinement, &[id])
                    .ok()?;
                let score = payload.confidence.unwrap_or(original_score);
                self.graph.set_score(refined, score);
                self.graph.set_state(refined, ThoughtState::Active);
                self.graph.set_state(id, ThoughtState::Refined);
                let _ = self
                    .graph
                    .add_edge(refined, id, EdgeRelation::Refines, 1.0);
                self.stats.refinements_made += 1;
                if let Some(node) = self.graph.node(refined) {
                    self.events.emit(SearchEvent::ThoughtGenerated {
                        id: refined,
                        depth: node.depth,
                        content: node.content.clone(),
                    });
                }
                self.events.emit(SearchEvent::ThoughtScored { id: refined, score });
                Some(refined)
            }
            Err(e) => {
                // The original is still above the prune threshold; keep it.
                self.stats.generation_errors += 1;
                self.events.emit(SearchEvent::GenerationFailed {
                    id,
                    error: e.to_string(),
                });
                warn!(thought = %id, error = %e, "Refinement failed, keeping original");
                None
            }
        }
    }

    /// Merge clusters of similar active thoughts into aggregation nodes.
    async fn aggregate_cohort(&mut self, active: Vec<ThoughtId>) -> Vec<ThoughtId> {
        if !self.options.enable_aggregation || active.len() < 2 {
            return active;
        }

        let mut remaining: Vec<ThoughtId> = active;
        let mut result = Vec::new();

        while let Some(head) = remaining.first().copied() {
            let (head_content, head_depth) = match self.graph.node(head) {
                Some(n) => (n.content.clone(), n.depth),
                None => {
                    remaining.remove(0);
                    continue;
                }
            };
            // A cohort can mix depths when a refinement node stands in for a
            // sibling; only same-depth thoughts are merged.
            let mut group = vec![head];
            remaining.retain(|&other| {
                if other == head {
                    return false;
                }
                let similar = self
                    .graph
                    .node(other)
                    .map_or(false, |n| {
                        n.depth == head_depth
                            && token_jaccard(&head_content, &n.content)
                                >= self.options.similarity_threshold
                    });
                if similar {
                    group.push(other);
                }
                !similar
            });

            if group.len() < 2 {
                result.push(head);
                continue;
            }

            match self.synthesize_group(&group).await {
                Some(agg) => result.push(agg),
                // Synthesis failed; the members stay active individually.
                None => result.extend(group),
            }
        }

        result
    }

    /// One oracle call merging a similarity group into a single node.
    async fn synthesize_group(&mut self, group: &[ThoughtId]) -> Option<ThoughtId> {
        let listing = group
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                self.graph
                    .node(*id)
                    .map(|n| format!("{}. {}", i + 1, n.content))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{}\n\nProblem:\n{}\n\nThoughts to merge:\n{}",
            AGGREGATE_THOUGHTS_PROMPT, self.problem, listing
        );

        match self.oracle.generate(&prompt, Effort::Medium).await {
            Ok(generation) => {
                self.stats.total_tokens.add(&generation.usage);
                let payload = self.parse_synthesis(&generation);
                let agg = self
                    .graph
                    .add_child(payload.content, ThoughtOrigin::Aggregation, group)
                    .ok()?;

                let score = if self.options.rescore_aggregations {
                    match self.oracle.score(
                        &self.graph.node(agg).map(|n| n.content.clone()).unwrap_or_default(),
                    )
                    .await
                    {
                        Ok(s) => s,
                        Err(e) => {
                            self.stats.evaluation_errors += 1;
                            warn!(error = %e, "Aggregation re-score failed, applying penalty");
                            self.penalized_score(group)
                        }
                    }
                } else {
                    self.penalized_score(group)
                };

                self.graph.set_score(agg, score);
                self.graph.set_state(agg, ThoughtState::Active);
                for &parent in group {
                    self.graph.set_state(parent, ThoughtState::Aggregated);
                    let _ = self
                        .graph
                        .add_edge(agg, parent, EdgeRelation::Supersedes, 1.0);
                }
                self.stats.aggregations_made += 1;
                self.events.emit(SearchEvent::AggregationComplete {
                    id: agg,
                    parents: group.to_vec(),
                });
                self.events.emit(SearchEvent::ThoughtScored { id: agg, score });
                Some(agg)
            }
            Err(e) => {
                self.stats.generation_errors += 1;
                warn!(error = %e, "Aggregation synthesis failed, keeping members");
                None
            }
        }
    }

    fn penalized_score(&self, group: &[ThoughtId]) -> f64 {
        let best_parent = group
            .iter()
            .filter_map(|id| self.graph.node(*id).and_then(|n| n.score))
            .fold(0.0_f64, f64::max);
        (best_parent - self.options.aggregation_penalty).clamp(0.0, 1.0)
    }

    fn generation_prompt(&self, id: ThoughtId) -> String {
        let path = self
            .graph
            .best_path(id)
            .iter()
            .filter_map(|step| self.graph.node(*step).map(|n| n.content.clone()))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\n\nProblem:\n{}\n\nReasoning path so far:\n{}\n\nGenerate up to {} diverse continuations.",
            GENERATE_THOUGHTS_PROMPT, self.problem, path, self.options.branching_factor
        )
    }

    fn parse_continuations(&self, generation: &Generation) -> Vec<ContinuationPayload> {
        match serde_json::from_str::<ContinuationsPayload>(extract_json(&generation.content)) {
            Ok(payload) => payload
                .continuations
                .into_iter()
                .take(self.options.branching_factor)
                .collect(),
            // Unstructured completion becomes a single continuation
            Err(_) => vec![ContinuationPayload {
                content: generation.content.clone(),
                confidence: generation.confidence,
                terminal: generation.terminal,
            }],
        }
    }

    fn parse_synthesis(&self, generation: &Generation) -> SynthesisPayload {
        serde_json::from_str::<SynthesisPayload>(extract_json(&generation.content)).unwrap_or(
            SynthesisPayload {
                content: generation.content.clone(),
                confidence: generation.confidence,
            },
        )
    }

    /// Assemble the report once the strategy loop has stopped.
    fn finish(mut self, termination: Termination) -> AppResult<SearchReport> {
        self.stats.total_thoughts = self.graph.len();
        self.stats.max_depth_reached = self.graph.max_depth();
        self.stats.total_duration_ms = self.started.elapsed().as_millis() as u64;

        let mut candidates: Vec<&ThoughtNode> = self
            .graph
            .nodes()
            .iter()
            .filter(|n| n.score.is_some())
            // Aggregated and refined thoughts were consumed as inputs; their
            // successors carry the line forward.
            .filter(|n| {
                !matches!(
                    n.state,
                    ThoughtState::Pruned
                        | ThoughtState::Failed
                        | ThoughtState::Discarded
                        | ThoughtState::Aggregated
                        | ThoughtState::Refined
                )
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let best_id = match self.terminal {
            Some(id) => Some(id),
            None => candidates.first().map(|n| n.id),
        };

        let failed_everything = best_id.is_none()
            && (self.stats.generation_errors + self.stats.evaluation_errors) > 0;
        if failed_everything {
            let message = format!(
                "every thought failed ({} generation errors, {} evaluation errors)",
                self.stats.generation_errors, self.stats.evaluation_errors
            );
            self.events.emit(SearchEvent::Error {
                message: message.clone(),
            });
            return Err(AppError::RunFailed { message });
        }

        let best_thoughts: Vec<ThoughtId> = match self.terminal {
            Some(id) => std::iter::once(id)
                .chain(candidates.iter().map(|n| n.id).filter(|&i| i != id))
                .take(self.options.best_count)
                .collect(),
            None => candidates
                .iter()
                .take(self.options.best_count)
                .map(|n| n.id)
                .collect(),
        };
        drop(candidates);

        let (answer, confidence, summary) = match best_id.and_then(|id| self.graph.node(id)) {
            Some(node) => {
                let summary = self
                    .graph
                    .best_path(node.id)
                    .iter()
                    .filter_map(|id| self.graph.node(*id).map(|n| n.content.clone()))
                    .collect::<Vec<_>>()
                    .join("\n-> ");
                (node.content.clone(), node.score.unwrap_or(0.0), summary)
            }
            // Nothing survived but nothing errored either: the oracle simply
            // produced no usable continuations.
            None => (
                self.problem.clone(),
                0.0,
                "no thoughts survived exploration".to_string(),
            ),
        };

        if let Some(id) = best_id {
            self.graph.set_state(id, ThoughtState::Selected);
        }

        let errors = self.stats.generation_errors + self.stats.evaluation_errors;
        let degraded = errors > 0 || best_id.is_none();
        let degraded_reason = if degraded {
            Some(if best_id.is_none() {
                "no thoughts survived exploration".to_string()
            } else {
                format!(
                    "{} generation and {} evaluation failures were skipped",
                    self.stats.generation_errors, self.stats.evaluation_errors
                )
            })
        } else {
            None
        };

        self.events.emit(SearchEvent::Done {
            total_thoughts: self.stats.total_thoughts,
        });
        info!(
            total_thoughts = self.stats.total_thoughts,
            pruned = self.stats.thoughts_pruned,
            aggregations = self.stats.aggregations_made,
            refinements = self.stats.refinements_made,
            duration_ms = self.stats.total_duration_ms,
            degraded,
            "Thought search finished"
        );

        let graph = GraphSnapshot {
            thoughts: self.graph.nodes().to_vec(),
            edges: self.graph.edges().to_vec(),
            best_thoughts,
        };

        Ok(SearchReport {
            answer,
            confidence,
            reasoning_summary: summary,
            stats: self.stats,
            graph,
            termination,
            degraded,
            degraded_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strategy_round_trip() {
        for strategy in [
            SearchStrategy::BreadthFirst,
            SearchStrategy::DepthFirst,
            SearchStrategy::BestFirst,
        ] {
            let parsed: SearchStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
    }

    #[test]
    fn test_strategy_aliases() {
        assert_eq!("bfs".parse::<SearchStrategy>().unwrap(), SearchStrategy::BreadthFirst);
        assert_eq!("dfs".parse::<SearchStrategy>().unwrap(), SearchStrategy::DepthFirst);
        assert!("random".parse::<SearchStrategy>().is_err());
    }

    #[test]
    fn test_options_validation() {
        let options = SearchOptions::default().with_branching_factor(0);
        let err = options.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "branching_factor"));

        let options = SearchOptions::default().with_branching_factor(11);
        assert!(options.validate().is_err());

        let options = SearchOptions::default().with_max_depth(0);
        assert!(options.validate().is_err());

        let mut options = SearchOptions::default();
        options.prune_threshold = 1.5;
        assert!(options.validate().is_err());

        let mut options = SearchOptions::default();
        options.refine_ceiling = 0.2;
        options.prune_threshold = 0.3;
        assert!(options.validate().is_err());

        assert!(SearchOptions::default().validate().is_ok());
    }

    #[test]
    fn test_token_jaccard() {
        assert_eq!(token_jaccard("a b c", "a b c"), 1.0);
        assert_eq!(token_jaccard("a b", "c d"), 0.0);
        // {cache, the, results} vs {cache, all, results}: 2 shared of 4
        let sim = token_jaccard("cache the results", "cache all results");
        assert!((sim - 0.5).abs() < 1e-9);
        // Case and punctuation are ignored
        assert_eq!(token_jaccard("Cache results!", "cache, results"), 1.0);
    }

    #[test]
    fn test_frontier_ordering() {
        let mut heap = BinaryHeap::new();
        heap.push(Frontier { score: 0.5, depth: 2, id: ThoughtId(3) });
        heap.push(Frontier { score: 0.9, depth: 4, id: ThoughtId(5) });
        heap.push(Frontier { score: 0.5, depth: 1, id: ThoughtId(7) });
        heap.push(Frontier { score: 0.5, depth: 1, id: ThoughtId(2) });

        // Highest score wins, then lower depth, then earlier id
        assert_eq!(heap.pop().map(|f| f.id), Some(ThoughtId(5)));
        assert_eq!(heap.pop().map(|f| f.id), Some(ThoughtId(2)));
        assert_eq!(heap.pop().map(|f| f.id), Some(ThoughtId(7)));
        assert_eq!(heap.pop().map(|f| f.id), Some(ThoughtId(3)));
    }

    #[test]
    fn test_continuations_payload_parses() {
        let json = r#"{"continuations": [
            {"content": "try a cache", "confidence": 0.8, "terminal": false},
            {"content": "done: use a cache", "terminal": true}
        ]}"#;
        let payload: ContinuationsPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.continuations.len(), 2);
        assert_eq!(payload.continuations[0].confidence, Some(0.8));
        assert!(payload.continuations[1].terminal);
        assert!(payload.continuations[1].confidence.is_none());
    }
}
