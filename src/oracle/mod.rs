//! Oracle seam: the external language-model collaborator.
//!
//! Engines depend only on the [`Oracle`] trait; [`HttpOracle`] is the
//! production implementation. The oracle is treated as opaque and
//! occasionally failing - every call may raise a transient [`OracleError`].
//!
//! [`OracleError`]: crate::error::OracleError

mod client;

pub use client::HttpOracle;
pub(crate) use client::extract_json;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OracleResult;

/// Effort tier for an oracle call, bounding cost per invocation.
///
/// Corrections run at [`Effort::Low`] to keep reviewer-triggered calls cheap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    /// Cheap, bounded call (corrections, quick scoring passes).
    Low,
    /// Standard call.
    #[default]
    Medium,
    /// Expensive, thorough call.
    High,
}

impl Effort {
    /// Token budget granted to a call at this tier.
    pub fn max_tokens(&self) -> u32 {
        match self {
            Effort::Low => 512,
            Effort::Medium => 2000,
            Effort::High => 4096,
        }
    }
}

impl std::fmt::Display for Effort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effort::Low => write!(f, "low"),
            Effort::Medium => write!(f, "medium"),
            Effort::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Effort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Effort::Low),
            "medium" => Ok(Effort::Medium),
            "high" => Ok(Effort::High),
            _ => Err(format!("Unknown effort tier: {}", s)),
        }
    }
}

/// Token accounting for a single oracle call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    pub completion_tokens: u32,
    /// Total tokens billed for the call.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Accumulate usage from another call, saturating on overflow.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// One completed generation from the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The generated content.
    pub content: String,
    /// Self-reported confidence (0.0-1.0), when the oracle provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Token accounting for the call.
    pub usage: TokenUsage,
    /// Whether the oracle signals this as a terminal answer.
    #[serde(default)]
    pub terminal: bool,
}

/// The external language-model collaborator.
///
/// Both methods may raise a transient failure; callers decide whether to
/// contain it (search loop, fork branch) or surface it.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generate content for the given prompt at the given effort tier.
    async fn generate(&self, prompt: &str, effort: Effort) -> OracleResult<Generation>;

    /// Score a piece of content, returning a quality score in [0.0, 1.0].
    async fn score(&self, content: &str) -> OracleResult<f64>;
}
