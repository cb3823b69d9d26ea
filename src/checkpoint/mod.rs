//! Checkpoint / Correction Flow: human verdicts over persisted reasoning.
//!
//! A checkpoint never rewrites history. Every verdict appends an annotation
//! to the target node and materializes a new `HumanAnnotation` node beside
//! it; a disagreement additionally grows a corrected branch from the target
//! via one cheap oracle call. The original node and its descendants are
//! never modified.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult, GraphError};
use crate::graph::{
    CheckpointAnnotation, NodeKind, ReasoningEdge, ReasoningGraph, ReasoningNode, Verdict,
};
use crate::oracle::{extract_json, Effort, Oracle};
use crate::prompts::CORRECTION_PROMPT;

/// How many ancestor-chain nodes are quoted in a correction prompt.
const DEFAULT_CONTEXT_WINDOW: usize = 3;

/// One reviewer checkpoint against a persisted node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointParams {
    pub session_id: String,
    pub target_node_id: String,
    pub verdict: Verdict,
    /// Required for a disagree verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    /// Ancestor-chain nodes included as correction context.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}

impl CheckpointParams {
    /// Checkpoint the given node with the given verdict
    pub fn new(
        session_id: impl Into<String>,
        target_node_id: impl Into<String>,
        verdict: Verdict,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            target_node_id: target_node_id.into(),
            verdict,
            correction: None,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Attach the reviewer's correction text
    pub fn with_correction(mut self, correction: impl Into<String>) -> Self {
        self.correction = Some(correction.into());
        self
    }

    /// Override how many ancestors the correction prompt quotes
    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }
}

/// What a checkpoint created.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointReport {
    /// The new `HumanAnnotation` node.
    pub annotation_node_id: String,
    /// The corrected `Thinking` node, present only after a successful
    /// disagree correction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_node_id: Option<String>,
    pub edges_created: usize,
    pub verdict: Verdict,
    /// Set when the correction oracle call failed; the annotation itself is
    /// never lost.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_error: Option<String>,
}

/// Applies reviewer checkpoints to a reasoning graph.
pub struct CheckpointFlow<O: Oracle + 'static> {
    oracle: Arc<O>,
}

impl<O: Oracle + 'static> CheckpointFlow<O> {
    /// Create a new flow over the given oracle
    pub fn new(oracle: Arc<O>) -> Self {
        Self { oracle }
    }

    /// Apply one checkpoint.
    ///
    /// Checkpoints are deliberately not idempotent: repeating the same
    /// verdict records two independent review events, each with its own
    /// annotation node.
    pub async fn apply(
        &self,
        graph: &mut ReasoningGraph,
        params: CheckpointParams,
    ) -> AppResult<CheckpointReport> {
        let target = graph
            .node(&params.target_node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: params.target_node_id.clone(),
            })?;
        let target_id = target.id.clone();

        let correction = params.correction.as_deref().map(str::trim).filter(|c| !c.is_empty());
        if params.verdict == Verdict::Disagree && correction.is_none() {
            return Err(AppError::Validation {
                field: "correction".to_string(),
                reason: "a disagree verdict requires correction text".to_string(),
            });
        }

        info!(
            session_id = %params.session_id,
            target = %target_id,
            verdict = %params.verdict,
            "Applying checkpoint"
        );

        let mut annotation = CheckpointAnnotation::new(params.verdict);
        if let Some(text) = correction {
            annotation = annotation.with_correction(text);
        }
        graph.append_annotation(&target_id, annotation)?;

        let mut edges_created = 0;

        let annotation_text = match correction {
            Some(text) => format!(
                "Reviewer verdict: {}. Correction: {}",
                params.verdict, text
            ),
            None => format!("Reviewer verdict: {}", params.verdict),
        };
        let annotation_node = ReasoningNode::new(&params.session_id, annotation_text)
            .with_parent(&target_id)
            .with_kind(NodeKind::HumanAnnotation)
            .with_confidence(params.verdict.confidence())
            .with_metadata(serde_json::json!({ "verdict": params.verdict }));
        let annotation_node_id = annotation_node.id.clone();
        graph.insert_node(annotation_node)?;
        graph.insert_edge(ReasoningEdge::new(
            &annotation_node_id,
            &target_id,
            params.verdict.edge_relation(),
        ))?;
        edges_created += 1;

        let (corrected_node_id, correction_error) = match (params.verdict, correction) {
            (Verdict::Disagree, Some(text)) => {
                match self
                    .correct(graph, &params.session_id, &target_id, text, params.context_window)
                    .await
                {
                    Ok(id) => {
                        edges_created += 1;
                        (Some(id), None)
                    }
                    Err(e) => {
                        warn!(target = %target_id, error = %e, "Correction call failed");
                        (None, Some(e.to_string()))
                    }
                }
            }
            _ => (None, None),
        };

        Ok(CheckpointReport {
            annotation_node_id,
            corrected_node_id,
            edges_created,
            verdict: params.verdict,
            correction_error,
        })
    }

    /// Grow a corrected branch from the disputed node: one oracle call at
    /// low effort, seeded with the recent ancestor chain and the reviewer's
    /// correction.
    async fn correct(
        &self,
        graph: &mut ReasoningGraph,
        session_id: &str,
        target_id: &str,
        correction: &str,
        context_window: usize,
    ) -> AppResult<String> {
        let chain = graph.ancestor_chain(target_id)?;
        // Chain is node-first; quote the recent window in chronological order
        let context = chain
            .iter()
            .take(context_window)
            .rev()
            .map(|n| n.reasoning.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "{}\n\nRecent reasoning chain:\n{}\n\nReviewer correction:\n\"{}\"",
            CORRECTION_PROMPT, context, correction
        );

        let generation = self.oracle.generate(&prompt, Effort::Low).await?;

        #[derive(Deserialize)]
        struct CorrectionPayload {
            content: String,
            #[serde(default)]
            confidence: Option<f64>,
        }
        let (content, confidence) = match serde_json::from_str::<CorrectionPayload>(
            extract_json(&generation.content),
        ) {
            Ok(p) => (p.content, p.confidence),
            Err(_) => (generation.content.clone(), generation.confidence),
        };

        let corrected = ReasoningNode::new(session_id, content)
            .with_parent(target_id)
            .with_confidence(confidence.unwrap_or(0.8))
            .with_tokens(generation.usage)
            .with_metadata(serde_json::json!({
                "corrected_branch": true,
                "correction_of": target_id,
            }));
        let corrected_id = corrected.id.clone();
        graph.insert_node(corrected)?;
        graph.insert_edge(ReasoningEdge::new(
            &corrected_id,
            target_id,
            crate::graph::EdgeRelation::Refines,
        ))?;

        info!(target = %target_id, corrected = %corrected_id, "Recorded corrected branch");
        Ok(corrected_id)
    }
}
