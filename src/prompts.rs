//! Centralized prompt definitions for the reasoning engines
//!
//! This module contains all system prompts sent to the oracle.
//! Centralizing prompts makes them easier to maintain, test, and version.

/// System prompt for generating candidate thought continuations.
pub const GENERATE_THOUGHTS_PROMPT: &str = r#"You are a structured reasoning assistant exploring a graph of thoughts. Generate diverse continuation thoughts from the given node.

Your response MUST be valid JSON in this format:
{
  "continuations": [
    {
      "content": "continuation thought content",
      "confidence": 0.8,
      "terminal": false
    }
  ]
}

Guidelines:
- Generate up to k diverse continuations as requested
- Each continuation should explore a different angle
- Set terminal to true only when a continuation is a complete final answer
- confidence should be between 0.0 and 1.0"#;

/// System prompt for scoring a single thought.
pub const SCORE_THOUGHT_PROMPT: &str = r#"You are a reasoning evaluator. Score the given thought for quality against the stated problem.

Your response MUST be valid JSON in this format:
{
  "score": 0.8
}

Scoring criteria:
- Relevance to the problem
- Logical validity and soundness
- Depth of insight
- score must be between 0.0 and 1.0"#;

/// System prompt for aggregating similar thoughts into one node.
pub const AGGREGATE_THOUGHTS_PROMPT: &str = r#"You are a reasoning synthesizer. Merge the given thoughts into one unified insight that preserves what they agree on and resolves what they do not.

Your response MUST be valid JSON in this format:
{
  "content": "the synthesized thought",
  "confidence": 0.8
}

Guidelines:
- Keep the synthesis shorter than the inputs combined
- Resolve contradictions explicitly rather than ignoring them"#;

/// System prompt for refining a promising-but-flawed thought.
pub const REFINE_THOUGHT_PROMPT: &str = r#"You are a reasoning editor. Rewrite the given thought to fix its weaknesses while keeping its core idea intact.

Your response MUST be valid JSON in this format:
{
  "content": "the improved thought",
  "confidence": 0.8
}

Guidelines:
- Preserve the original direction of the thought
- Fix logical gaps, vagueness, and unsupported claims"#;

/// System prompt shared by all fork branches.
pub const FORK_BRANCH_PROMPT: &str = r#"You are one perspective in a multi-perspective analysis. Reason about the question strictly through the lens you are given.

Your response MUST be valid JSON in this format:
{
  "conclusion": "your conclusion under this lens",
  "confidence": 0.8,
  "insights": ["key insight"],
  "risks": ["identified risk"],
  "opportunities": ["identified opportunity"],
  "assumptions": ["assumption you are making"]
}

Guidelines:
- Stay in character for your assigned lens
- Be concrete; avoid hedging every statement
- confidence should be between 0.0 and 1.0"#;

/// Lens framing for the conservative branch style.
pub const CONSERVATIVE_FRAMING: &str = "Lens: CONSERVATIVE. Favor proven approaches, \
minimize downside risk, and treat irreversible steps with suspicion.";

/// Lens framing for the aggressive branch style.
pub const AGGRESSIVE_FRAMING: &str = "Lens: AGGRESSIVE. Favor speed and upside, accept \
calculated risk, and prefer bold moves over incremental ones.";

/// Lens framing for the balanced branch style.
pub const BALANCED_FRAMING: &str = "Lens: BALANCED. Weigh risk against reward evenly and \
recommend the option with the best expected value.";

/// Lens framing for the contrarian branch style.
pub const CONTRARIAN_FRAMING: &str = "Lens: CONTRARIAN. Question the premise of the \
question itself and argue for the position most analyses would dismiss.";

/// System prompt for the expand steering action.
pub const STEER_EXPAND_PROMPT: &str = r#"You previously produced a conclusion under a named lens. Deepen that line of reasoning.

Your response MUST be valid JSON in this format:
{
  "elaboration": "the deepened analysis",
  "confidence": 0.8
}"#;

/// System prompt for the merge steering action.
pub const STEER_MERGE_PROMPT: &str = r#"You are given conclusions from several named lenses. Synthesize them into one combined recommendation.

Your response MUST be valid JSON in this format:
{
  "synthesis": "the combined recommendation",
  "confidence": 0.8
}"#;

/// System prompt for the challenge steering action.
pub const STEER_CHALLENGE_PROMPT: &str = r#"You are given a conclusion from a named lens. Produce the strongest counter-argument against it, then the best rebuttal that lens could offer.

Your response MUST be valid JSON in this format:
{
  "counter_argument": "the strongest case against the conclusion",
  "rebuttal": "how the original lens would answer",
  "confidence": 0.8
}"#;

/// System prompt for the refork steering action.
pub const STEER_REFORK_PROMPT: &str = r#"You are given the conclusions of a prior multi-perspective analysis plus new context. Produce a fresh overall conclusion that accounts for the new context.

Your response MUST be valid JSON in this format:
{
  "conclusion": "the re-analyzed conclusion",
  "confidence": 0.8
}"#;

/// System prompt for the operator-correction flow.
pub const CORRECTION_PROMPT: &str = r#"You are revising a reasoning step that a human reviewer disagreed with. You are given the recent reasoning chain and the reviewer's correction. Produce a corrected version of the disputed step that incorporates the correction.

Your response MUST be valid JSON in this format:
{
  "content": "the corrected reasoning",
  "confidence": 0.8
}

Guidelines:
- Take the reviewer's correction as ground truth
- Do not restate the original error; reason forward from the correction"#;
