//! Branch Analysis Engine: fork one question into styled perspectives.
//!
//! A fork issues one isolated oracle call per branch style, concurrently,
//! and only analyzes once every branch has settled. A failed branch degrades
//! to an errored result instead of aborting the run; convergence and
//! divergence are computed over the branches that succeeded.

mod steering;

pub use steering::{SteerAction, SteerOutcome, SteerRecord};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::ForkDefaults;
use crate::error::{AppError, AppResult, GraphResult, OracleResult};
use crate::graph::{NodeKind, ReasoningGraph, ReasoningNode};
use crate::oracle::{extract_json, Effort, Generation, Oracle, TokenUsage};
use crate::prompts::{
    AGGRESSIVE_FRAMING, BALANCED_FRAMING, CONSERVATIVE_FRAMING, CONTRARIAN_FRAMING,
    FORK_BRANCH_PROMPT,
};

/// Reasoning lens assigned to one fork branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStyle {
    Conservative,
    Aggressive,
    Balanced,
    Contrarian,
}

impl BranchStyle {
    /// All four styles, the default branch set.
    pub fn all() -> [BranchStyle; 4] {
        [
            BranchStyle::Conservative,
            BranchStyle::Aggressive,
            BranchStyle::Balanced,
            BranchStyle::Contrarian,
        ]
    }

    /// Lens framing prepended to the branch prompt.
    pub fn framing(&self) -> &'static str {
        match self {
            BranchStyle::Conservative => CONSERVATIVE_FRAMING,
            BranchStyle::Aggressive => AGGRESSIVE_FRAMING,
            BranchStyle::Balanced => BALANCED_FRAMING,
            BranchStyle::Contrarian => CONTRARIAN_FRAMING,
        }
    }
}

impl std::fmt::Display for BranchStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchStyle::Conservative => write!(f, "conservative"),
            BranchStyle::Aggressive => write!(f, "aggressive"),
            BranchStyle::Balanced => write!(f, "balanced"),
            BranchStyle::Contrarian => write!(f, "contrarian"),
        }
    }
}

impl std::str::FromStr for BranchStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(BranchStyle::Conservative),
            "aggressive" => Ok(BranchStyle::Aggressive),
            "balanced" => Ok(BranchStyle::Balanced),
            "contrarian" => Ok(BranchStyle::Contrarian),
            _ => Err(format!("Unknown branch style: {}", s)),
        }
    }
}

/// Parameters for one fork run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkParams {
    pub query: String,
    pub styles: Vec<BranchStyle>,
    #[serde(default)]
    pub effort: Effort,
    /// Extra per-style instructions layered onto the framing.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub branch_guidance: HashMap<BranchStyle, String>,
}

impl ForkParams {
    /// Fork the given query across all four styles
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            styles: BranchStyle::all().to_vec(),
            effort: Effort::default(),
            branch_guidance: HashMap::new(),
        }
    }

    /// Restrict the fork to the given styles
    pub fn with_styles(mut self, styles: Vec<BranchStyle>) -> Self {
        self.styles = styles;
        self
    }

    /// Set the effort tier for every branch
    pub fn with_effort(mut self, effort: Effort) -> Self {
        self.effort = effort;
        self
    }

    /// Add guidance for one style
    pub fn with_guidance(mut self, style: BranchStyle, guidance: impl Into<String>) -> Self {
        self.branch_guidance.insert(style, guidance.into());
        self
    }

    /// Validate before any oracle call is made.
    pub fn validate(&self) -> AppResult<()> {
        if self.query.trim().is_empty() {
            return Err(AppError::Validation {
                field: "query".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        if self.styles.is_empty() {
            return Err(AppError::Validation {
                field: "styles".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for style in &self.styles {
            if !seen.insert(style) {
                return Err(AppError::Validation {
                    field: "styles".to_string(),
                    reason: format!("duplicate style: {}", style),
                });
            }
        }
        for style in self.branch_guidance.keys() {
            if !self.styles.contains(style) {
                return Err(AppError::Validation {
                    field: "branch_guidance".to_string(),
                    reason: format!("guidance for style not in the fork: {}", style),
                });
            }
        }
        Ok(())
    }
}

/// Oracle spend attributed to one branch or steering action.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BranchCost {
    pub total_tokens: u32,
    pub duration_ms: u64,
}

/// Outcome of one styled branch; failed branches carry an error and zeroed
/// analysis fields rather than aborting the fork.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkBranchResult {
    pub style: BranchStyle,
    pub conclusion: String,
    pub confidence: f64,
    pub insights: Vec<String>,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub assumptions: Vec<String>,
    pub cost: BranchCost,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ForkBranchResult {
    /// Whether this branch completed without an oracle failure.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    fn failed(style: BranchStyle, error: String, duration_ms: u64) -> Self {
        Self {
            style,
            conclusion: String::new(),
            confidence: 0.0,
            insights: Vec::new(),
            risks: Vec::new(),
            opportunities: Vec::new(),
            assumptions: Vec::new(),
            cost: BranchCost {
                total_tokens: 0,
                duration_ms,
            },
            error: Some(error),
        }
    }
}

/// Structured payload embedded in a branch completion
#[derive(Debug, Clone, Deserialize)]
struct BranchPayload {
    conclusion: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    insights: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    opportunities: Vec<String>,
    #[serde(default)]
    assumptions: Vec<String>,
}

/// How widely the succeeded branches engage a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    /// Every succeeded branch engages the topic.
    Full,
    /// More than half of the succeeded branches engage the topic.
    Partial,
}

/// A topic the branches agree on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergencePoint {
    pub topic: String,
    pub agreement: Agreement,
    pub styles: Vec<BranchStyle>,
}

/// One style's stance on a contested topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylePosition {
    pub style: BranchStyle,
    pub position: String,
    pub confidence: f64,
}

/// A topic the branches split on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergencePoint {
    pub topic: String,
    pub positions: Vec<StylePosition>,
}

/// Result of one fork run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkReport {
    pub branches: Vec<ForkBranchResult>,
    pub convergence_points: Vec<ConvergencePoint>,
    pub divergence_points: Vec<DivergencePoint>,
    pub meta_insight: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_approach: Option<BranchStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_guidance: Option<HashMap<BranchStyle, String>>,
}

impl ForkReport {
    /// Find a branch by style.
    pub fn branch(&self, style: BranchStyle) -> Option<&ForkBranchResult> {
        self.branches.iter().find(|b| b.style == style)
    }

    /// Persist one `ForkBranch` reasoning node per branch into the store.
    /// Returns the new node ids in branch order.
    pub fn record_into(
        &self,
        graph: &mut ReasoningGraph,
        session_id: &str,
        parent_id: Option<&str>,
    ) -> GraphResult<Vec<String>> {
        let mut ids = Vec::with_capacity(self.branches.len());
        for branch in &self.branches {
            let reasoning = if branch.succeeded() {
                branch.conclusion.clone()
            } else {
                format!("branch failed: {}", branch.error.as_deref().unwrap_or("unknown"))
            };
            let mut node = ReasoningNode::new(session_id, reasoning)
                .with_kind(NodeKind::ForkBranch)
                .with_confidence(branch.confidence)
                .with_tokens(TokenUsage {
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: branch.cost.total_tokens,
                })
                .with_metadata(serde_json::json!({
                    "style": branch.style,
                    "insights": branch.insights,
                    "risks": branch.risks,
                    "opportunities": branch.opportunities,
                    "assumptions": branch.assumptions,
                    "error": branch.error,
                }));
            if let Some(parent) = parent_id {
                node = node.with_parent(parent);
            }
            ids.push(node.id.clone());
            graph.insert_node(node)?;
        }
        Ok(ids)
    }
}

/// Multi-perspective branch analysis over an oracle.
pub struct ForkEngine<O: Oracle + 'static> {
    oracle: Arc<O>,
    thresholds: ForkDefaults,
}

impl<O: Oracle + 'static> ForkEngine<O> {
    /// Create a new engine with default meta-insight thresholds
    pub fn new(oracle: Arc<O>) -> Self {
        Self {
            oracle,
            thresholds: ForkDefaults::default(),
        }
    }

    /// Override the meta-insight confidence thresholds
    pub fn with_thresholds(mut self, thresholds: ForkDefaults) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Run one fork: one oracle call per style, concurrently, then analyze.
    pub async fn fork(&self, params: ForkParams) -> AppResult<ForkReport> {
        params.validate()?;

        info!(
            styles = params.styles.len(),
            effort = %params.effort,
            "Starting fork analysis"
        );

        let mut set: JoinSet<(BranchStyle, OracleResult<Generation>, u64)> = JoinSet::new();
        for &style in &params.styles {
            let prompt = branch_prompt(&params, style);
            let oracle = Arc::clone(&self.oracle);
            let effort = params.effort;
            set.spawn(async move {
                let start = Instant::now();
                let result = oracle.generate(&prompt, effort).await;
                (style, result, start.elapsed().as_millis() as u64)
            });
        }

        // Join barrier: every branch settles before analysis; partial results
        // never drive the synthesis below.
        let mut by_style: HashMap<BranchStyle, ForkBranchResult> = HashMap::new();
        while let Some(joined) = set.join_next().await {
            let Ok((style, result, duration_ms)) = joined else {
                continue;
            };
            let branch = match result {
                Ok(generation) => parse_branch(style, &generation, duration_ms),
                Err(e) => {
                    warn!(style = %style, error = %e, "Branch failed");
                    ForkBranchResult::failed(style, e.to_string(), duration_ms)
                }
            };
            by_style.insert(style, branch);
        }

        // Branches are reported in the order they were requested
        let branches: Vec<ForkBranchResult> = params
            .styles
            .iter()
            .filter_map(|style| by_style.remove(style))
            .collect();

        let (convergence_points, divergence_points) = analyze_topics(&branches);
        let meta_insight = meta_insight(&self.thresholds, &branches);
        let recommended_approach = branches
            .iter()
            .filter(|b| b.succeeded())
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|b| b.style);

        let applied_guidance = if params.branch_guidance.is_empty() {
            None
        } else {
            Some(params.branch_guidance)
        };

        info!(
            succeeded = branches.iter().filter(|b| b.succeeded()).count(),
            failed = branches.iter().filter(|b| !b.succeeded()).count(),
            convergence = convergence_points.len(),
            divergence = divergence_points.len(),
            "Fork analysis finished"
        );

        Ok(ForkReport {
            branches,
            convergence_points,
            divergence_points,
            meta_insight,
            recommended_approach,
            applied_guidance,
        })
    }

}

/// Classify overall confidence across the succeeded branches.
fn meta_insight(thresholds: &ForkDefaults, branches: &[ForkBranchResult]) -> String {
    let succeeded: Vec<&ForkBranchResult> = branches.iter().filter(|b| b.succeeded()).collect();
    if succeeded.is_empty() {
        return format!(
            "All {} branches failed; no perspective analysis is available for this query.",
            branches.len()
        );
    }

    let mean = succeeded.iter().map(|b| b.confidence).sum::<f64>() / succeeded.len() as f64;
    let percent = format!("{:.0}%", mean * 100.0);

    if mean >= thresholds.high_confidence {
        format!(
            "All perspectives reach their conclusions with high confidence (average {}); \
             the recommendation is robust across reasoning styles.",
            percent
        )
    } else if mean < thresholds.low_confidence {
        format!(
            "Confidence is low across perspectives (average {}); treat any conclusion \
             from this fork as provisional and gather more information.",
            percent
        )
    } else {
        format!(
            "Perspectives disagree in their certainty, averaging {} confidence; weigh \
             the divergence points before committing to an approach.",
            percent
        )
    }
}

fn branch_prompt(params: &ForkParams, style: BranchStyle) -> String {
    let mut prompt = format!("{}\n\n{}", FORK_BRANCH_PROMPT, style.framing());
    if let Some(guidance) = params.branch_guidance.get(&style) {
        prompt.push_str("\n\nAdditional guidance: ");
        prompt.push_str(guidance);
    }
    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(&params.query);
    prompt
}

fn parse_branch(
    style: BranchStyle,
    generation: &Generation,
    duration_ms: u64,
) -> ForkBranchResult {
    let cost = BranchCost {
        total_tokens: generation.usage.total_tokens,
        duration_ms,
    };
    match serde_json::from_str::<BranchPayload>(extract_json(&generation.content)) {
        Ok(payload) => ForkBranchResult {
            style,
            conclusion: payload.conclusion,
            confidence: payload
                .confidence
                .or(generation.confidence)
                .unwrap_or(0.5)
                .clamp(0.0, 1.0),
            insights: payload.insights,
            risks: payload.risks,
            opportunities: payload.opportunities,
            assumptions: payload.assumptions,
            cost,
            error: None,
        },
        // Unstructured completion still counts as a conclusion
        Err(_) => ForkBranchResult {
            style,
            conclusion: generation.content.clone(),
            confidence: generation.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            insights: Vec::new(),
            risks: Vec::new(),
            opportunities: Vec::new(),
            assumptions: Vec::new(),
            cost,
            error: None,
        },
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "that", "with", "this", "from", "have", "will", "would", "should",
    "could", "their", "them", "they", "then", "than", "when", "what", "which", "while",
    "about", "into", "over", "more", "most", "some", "such", "only", "also", "been",
    "being", "because", "these", "those", "there", "where", "after", "before", "under",
    "between", "through", "your", "must", "very", "each", "other", "does", "against",
];

const MAX_TOPICS: usize = 8;

fn topic_terms(text: &str) -> std::collections::HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 4 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Deterministic convergence analysis over the succeeded branches: salient
/// terms shared widely become convergence points, contested terms become
/// divergence points with each engaging style's position attached.
fn analyze_topics(
    branches: &[ForkBranchResult],
) -> (Vec<ConvergencePoint>, Vec<DivergencePoint>) {
    let succeeded: Vec<&ForkBranchResult> = branches.iter().filter(|b| b.succeeded()).collect();
    if succeeded.len() < 2 {
        return (Vec::new(), Vec::new());
    }

    let term_sets: Vec<(BranchStyle, std::collections::HashSet<String>)> = succeeded
        .iter()
        .map(|b| (b.style, topic_terms(&b.conclusion)))
        .collect();

    // Rank candidate topics by how many branches engage them
    let mut counts: HashMap<&str, Vec<BranchStyle>> = HashMap::new();
    for (style, terms) in &term_sets {
        for term in terms {
            counts.entry(term.as_str()).or_default().push(*style);
        }
    }
    let mut topics: Vec<(&str, Vec<BranchStyle>)> = counts
        .into_iter()
        .filter(|(_, styles)| styles.len() >= 2 || succeeded.len() == 2)
        .collect();
    topics.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));
    topics.truncate(MAX_TOPICS);

    let total = succeeded.len();
    let mut convergence = Vec::new();
    let mut divergence = Vec::new();
    for (topic, mut styles) in topics {
        styles.sort_by_key(|s| s.to_string());
        let engaged = styles.len();
        if engaged == total {
            convergence.push(ConvergencePoint {
                topic: topic.to_string(),
                agreement: Agreement::Full,
                styles,
            });
        } else if engaged * 2 > total {
            convergence.push(ConvergencePoint {
                topic: topic.to_string(),
                agreement: Agreement::Partial,
                styles,
            });
        } else {
            let positions = succeeded
                .iter()
                .filter(|b| styles.contains(&b.style))
                .map(|b| StylePosition {
                    style: b.style,
                    position: b.conclusion.clone(),
                    confidence: b.confidence,
                })
                .collect();
            divergence.push(DivergencePoint {
                topic: topic.to_string(),
                positions,
            });
        }
    }

    (convergence, divergence)
}
