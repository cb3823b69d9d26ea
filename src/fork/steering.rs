//! Steering actions over a completed fork report.
//!
//! Steering never re-runs the fork: each action is a single oracle call
//! grounded in the prior branch conclusions. Validation happens first and a
//! rejected action costs zero oracle calls.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{BranchCost, BranchStyle, ForkBranchResult, ForkEngine, ForkReport};
use crate::error::{AppError, AppResult};
use crate::oracle::{extract_json, Effort, Generation, Oracle};
use crate::prompts::{
    STEER_CHALLENGE_PROMPT, STEER_EXPAND_PROMPT, STEER_MERGE_PROMPT, STEER_REFORK_PROMPT,
};

/// Follow-up action on a fork report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SteerAction {
    /// Deepen one branch's line of reasoning.
    Expand {
        style: BranchStyle,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<String>,
    },
    /// Synthesize two or more succeeded branches into one recommendation.
    Merge {
        styles: Vec<BranchStyle>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        focus: Option<String>,
    },
    /// Produce the strongest counter-argument to one branch, plus its
    /// rebuttal.
    Challenge { style: BranchStyle },
    /// Re-conclude over the prior conclusions plus new context.
    Refork {
        added_context: String,
        #[serde(default)]
        retain_originals: bool,
    },
}

/// What a steering action produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SteerOutcome {
    Expanded {
        style: BranchStyle,
        elaboration: String,
    },
    Merged {
        styles: Vec<BranchStyle>,
        synthesis: String,
    },
    Challenged {
        style: BranchStyle,
        counter_argument: String,
        rebuttal: String,
    },
    Reforked {
        conclusion: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        original_conclusions: Option<Vec<String>>,
    },
}

/// Record of one steering action, including its oracle spend.
#[derive(Debug, Clone, Serialize)]
pub struct SteerRecord {
    pub outcome: SteerOutcome,
    pub confidence: f64,
    pub cost: BranchCost,
}

#[derive(Debug, Clone, Deserialize)]
struct ExpandPayload {
    elaboration: String,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct MergePayload {
    synthesis: String,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChallengePayload {
    counter_argument: String,
    #[serde(default)]
    rebuttal: String,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReforkPayload {
    conclusion: String,
    #[serde(default)]
    confidence: Option<f64>,
}

fn require_succeeded(report: &ForkReport, style: BranchStyle) -> AppResult<&ForkBranchResult> {
    let branch = report.branch(style).ok_or_else(|| AppError::Validation {
        field: "style".to_string(),
        reason: format!("style not present in the report: {}", style),
    })?;
    if !branch.succeeded() {
        return Err(AppError::Validation {
            field: "style".to_string(),
            reason: format!("branch {} failed and cannot be steered", style),
        });
    }
    Ok(branch)
}

impl<O: Oracle + 'static> ForkEngine<O> {
    /// Apply one steering action to a prior report.
    pub async fn steer(&self, report: &ForkReport, action: SteerAction) -> AppResult<SteerRecord> {
        match action {
            SteerAction::Expand { style, direction } => {
                let branch = require_succeeded(report, style)?;
                let mut prompt = format!(
                    "{}\n\nLens: {}\nConclusion:\n{}",
                    STEER_EXPAND_PROMPT, style, branch.conclusion
                );
                if let Some(direction) = &direction {
                    prompt.push_str("\n\nFocus the elaboration on: ");
                    prompt.push_str(direction);
                }

                let (generation, cost) = self.one_call(&prompt).await?;
                let (elaboration, confidence) = match serde_json::from_str::<ExpandPayload>(
                    extract_json(&generation.content),
                ) {
                    Ok(p) => (p.elaboration, p.confidence),
                    Err(_) => (generation.content.clone(), generation.confidence),
                };
                info!(action = "expand", style = %style, tokens = cost.total_tokens, "Steered fork");
                Ok(SteerRecord {
                    outcome: SteerOutcome::Expanded { style, elaboration },
                    confidence: confidence.unwrap_or(branch.confidence).clamp(0.0, 1.0),
                    cost,
                })
            }

            SteerAction::Merge { styles, focus } => {
                if styles.len() < 2 {
                    return Err(AppError::Validation {
                        field: "styles".to_string(),
                        reason: "merge requires at least 2 styles".to_string(),
                    });
                }
                let mut seen = std::collections::HashSet::new();
                for style in &styles {
                    if !seen.insert(style) {
                        return Err(AppError::Validation {
                            field: "styles".to_string(),
                            reason: format!("duplicate style: {}", style),
                        });
                    }
                }
                let mut listing = String::new();
                for &style in &styles {
                    let branch = require_succeeded(report, style)?;
                    listing.push_str(&format!("[{}] {}\n", style, branch.conclusion));
                }

                let mut prompt =
                    format!("{}\n\nConclusions:\n{}", STEER_MERGE_PROMPT, listing);
                if let Some(focus) = &focus {
                    prompt.push_str("\nFocus the synthesis on: ");
                    prompt.push_str(focus);
                }

                let (generation, cost) = self.one_call(&prompt).await?;
                let (synthesis, confidence) = match serde_json::from_str::<MergePayload>(
                    extract_json(&generation.content),
                ) {
                    Ok(p) => (p.synthesis, p.confidence),
                    Err(_) => (generation.content.clone(), generation.confidence),
                };
                info!(action = "merge", styles = styles.len(), tokens = cost.total_tokens, "Steered fork");
                Ok(SteerRecord {
                    outcome: SteerOutcome::Merged { styles, synthesis },
                    confidence: confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                    cost,
                })
            }

            SteerAction::Challenge { style } => {
                let branch = require_succeeded(report, style)?;
                let prompt = format!(
                    "{}\n\nLens: {}\nConclusion:\n{}",
                    STEER_CHALLENGE_PROMPT, style, branch.conclusion
                );

                let (generation, cost) = self.one_call(&prompt).await?;
                let (counter_argument, rebuttal, confidence) =
                    match serde_json::from_str::<ChallengePayload>(extract_json(
                        &generation.content,
                    )) {
                        Ok(p) => (p.counter_argument, p.rebuttal, p.confidence),
                        Err(_) => (generation.content.clone(), String::new(), generation.confidence),
                    };
                info!(action = "challenge", style = %style, tokens = cost.total_tokens, "Steered fork");
                Ok(SteerRecord {
                    outcome: SteerOutcome::Challenged {
                        style,
                        counter_argument,
                        rebuttal,
                    },
                    confidence: confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                    cost,
                })
            }

            SteerAction::Refork {
                added_context,
                retain_originals,
            } => {
                if added_context.trim().is_empty() {
                    return Err(AppError::Validation {
                        field: "added_context".to_string(),
                        reason: "cannot be empty".to_string(),
                    });
                }
                let originals: Vec<String> = report
                    .branches
                    .iter()
                    .filter(|b| b.succeeded())
                    .map(|b| format!("[{}] {}", b.style, b.conclusion))
                    .collect();
                let prompt = format!(
                    "{}\n\nPrior conclusions:\n{}\n\nNew context:\n{}",
                    STEER_REFORK_PROMPT,
                    originals.join("\n"),
                    added_context
                );

                let (generation, cost) = self.one_call(&prompt).await?;
                let (conclusion, confidence) = match serde_json::from_str::<ReforkPayload>(
                    extract_json(&generation.content),
                ) {
                    Ok(p) => (p.conclusion, p.confidence),
                    Err(_) => (generation.content.clone(), generation.confidence),
                };
                info!(action = "refork", tokens = cost.total_tokens, "Steered fork");
                Ok(SteerRecord {
                    outcome: SteerOutcome::Reforked {
                        conclusion,
                        original_conclusions: retain_originals.then_some(originals),
                    },
                    confidence: confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                    cost,
                })
            }
        }
    }

    async fn one_call(&self, prompt: &str) -> AppResult<(Generation, BranchCost)> {
        let start = Instant::now();
        let generation = self.oracle.generate(prompt, Effort::Medium).await?;
        let cost = BranchCost {
            total_tokens: generation.usage.total_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        Ok((generation, cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::error::OracleResult;
    use crate::oracle::TokenUsage;

    /// Counts calls so validation tests can assert the oracle was never hit.
    #[derive(Default)]
    struct CountingOracle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Oracle for CountingOracle {
        async fn generate(&self, _prompt: &str, _effort: Effort) -> OracleResult<Generation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Generation {
                content: r#"{"synthesis": "combined", "confidence": 0.7}"#.to_string(),
                confidence: None,
                usage: TokenUsage::default(),
                terminal: false,
            })
        }

        async fn score(&self, _content: &str) -> OracleResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0.5)
        }
    }

    fn report() -> ForkReport {
        ForkReport {
            branches: vec![
                ForkBranchResult {
                    style: BranchStyle::Conservative,
                    conclusion: "keep it".to_string(),
                    confidence: 0.8,
                    insights: Vec::new(),
                    risks: Vec::new(),
                    opportunities: Vec::new(),
                    assumptions: Vec::new(),
                    cost: BranchCost::default(),
                    error: None,
                },
                ForkBranchResult {
                    style: BranchStyle::Aggressive,
                    conclusion: String::new(),
                    confidence: 0.0,
                    insights: Vec::new(),
                    risks: Vec::new(),
                    opportunities: Vec::new(),
                    assumptions: Vec::new(),
                    cost: BranchCost::default(),
                    error: Some("timeout".to_string()),
                },
                ForkBranchResult {
                    style: BranchStyle::Balanced,
                    conclusion: "measure first".to_string(),
                    confidence: 0.6,
                    insights: Vec::new(),
                    risks: Vec::new(),
                    opportunities: Vec::new(),
                    assumptions: Vec::new(),
                    cost: BranchCost::default(),
                    error: None,
                },
            ],
            convergence_points: Vec::new(),
            divergence_points: Vec::new(),
            meta_insight: String::new(),
            recommended_approach: Some(BranchStyle::Conservative),
            applied_guidance: None,
        }
    }

    #[tokio::test]
    async fn test_expand_unknown_style_costs_zero_calls() {
        let oracle = Arc::new(CountingOracle::default());
        let engine = ForkEngine::new(Arc::clone(&oracle));
        let err = engine
            .steer(
                &report(),
                SteerAction::Expand {
                    style: BranchStyle::Contrarian,
                    direction: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_steer_failed_branch_rejected() {
        let oracle = Arc::new(CountingOracle::default());
        let engine = ForkEngine::new(Arc::clone(&oracle));
        let err = engine
            .steer(
                &report(),
                SteerAction::Challenge {
                    style: BranchStyle::Aggressive,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_merge_requires_two_styles() {
        let oracle = Arc::new(CountingOracle::default());
        let engine = ForkEngine::new(Arc::clone(&oracle));
        let err = engine
            .steer(
                &report(),
                SteerAction::Merge {
                    styles: vec![BranchStyle::Conservative],
                    focus: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_merge_is_exactly_one_call() {
        let oracle = Arc::new(CountingOracle::default());
        let engine = ForkEngine::new(Arc::clone(&oracle));
        let record = engine
            .steer(
                &report(),
                SteerAction::Merge {
                    styles: vec![BranchStyle::Conservative, BranchStyle::Balanced],
                    focus: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(record.confidence, 0.7);
        assert!(matches!(
            record.outcome,
            SteerOutcome::Merged { ref synthesis, .. } if synthesis == "combined"
        ));
    }

    #[tokio::test]
    async fn test_refork_requires_context_and_echoes_originals() {
        let oracle = Arc::new(CountingOracle::default());
        let engine = ForkEngine::new(Arc::clone(&oracle));

        let err = engine
            .steer(
                &report(),
                SteerAction::Refork {
                    added_context: "   ".to_string(),
                    retain_originals: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);

        let record = engine
            .steer(
                &report(),
                SteerAction::Refork {
                    added_context: "the migration deadline moved up".to_string(),
                    retain_originals: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        match record.outcome {
            SteerOutcome::Reforked {
                original_conclusions: Some(originals),
                ..
            } => {
                // Only the two succeeded branches are echoed
                assert_eq!(originals.len(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
