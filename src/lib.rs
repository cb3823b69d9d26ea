//! mindgraph - graph-based reasoning over a language-model oracle.
//!
//! The crate turns oracle calls into a navigable, auditable reasoning
//! artifact:
//!
//! - [`graph`] - the persisted reasoning graph: append-only nodes, typed
//!   edges, decision points, and reviewer annotations.
//! - [`search`] - Graph-of-Thoughts exploration: breadth-first, depth-first,
//!   and best-first strategies with scoring, pruning, aggregation, and
//!   refinement.
//! - [`fork`] - multi-perspective branch analysis with convergence and
//!   divergence detection, plus steering actions over a finished report.
//! - [`checkpoint`] - human verdicts and oracle-assisted corrections that
//!   extend the graph without rewriting it.
//! - [`oracle`] - the seam to the language model: an async trait plus the
//!   retrying HTTP implementation.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fork;
pub mod graph;
pub mod oracle;
pub mod prompts;
pub mod search;

pub use checkpoint::{CheckpointFlow, CheckpointParams, CheckpointReport};
pub use config::Config;
pub use error::{AppError, AppResult, GraphError, OracleError};
pub use fork::{
    BranchStyle, ForkBranchResult, ForkEngine, ForkParams, ForkReport, SteerAction, SteerRecord,
};
pub use graph::{
    CheckpointAnnotation, DecisionPoint, EdgeRelation, NodeKind, ReasoningEdge, ReasoningGraph,
    ReasoningNode, Verdict,
};
pub use oracle::{Effort, Generation, HttpOracle, Oracle, TokenUsage};
pub use search::{
    SearchEvent, SearchOptions, SearchReport, SearchStrategy, ThoughtGraph, ThoughtId,
    ThoughtSearchEngine,
};
