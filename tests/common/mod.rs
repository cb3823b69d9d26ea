//! Shared test doubles for the engine integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use mindgraph::error::OracleResult;
use mindgraph::oracle::{Effort, Generation, Oracle, TokenUsage};

type GenerateFn = dyn Fn(usize, &str) -> OracleResult<Generation> + Send + Sync;
type ScoreFn = dyn Fn(usize, &str) -> OracleResult<f64> + Send + Sync;

/// Scripted oracle: closures decide each response, keyed by call index and
/// the prompt text, so tests stay deterministic without any HTTP.
pub struct MockOracle {
    generate_fn: Box<GenerateFn>,
    score_fn: Box<ScoreFn>,
    generate_calls: AtomicUsize,
    score_calls: AtomicUsize,
}

impl MockOracle {
    pub fn new(
        generate_fn: impl Fn(usize, &str) -> OracleResult<Generation> + Send + Sync + 'static,
        score_fn: impl Fn(usize, &str) -> OracleResult<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            generate_fn: Box::new(generate_fn),
            score_fn: Box::new(score_fn),
            generate_calls: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
        }
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn generate(&self, prompt: &str, _effort: Effort) -> OracleResult<Generation> {
        let index = self.generate_calls.fetch_add(1, Ordering::SeqCst);
        (self.generate_fn)(index, prompt)
    }

    async fn score(&self, content: &str) -> OracleResult<f64> {
        let index = self.score_calls.fetch_add(1, Ordering::SeqCst);
        (self.score_fn)(index, content)
    }
}

/// Build a generation whose content is a continuations payload.
#[allow(dead_code)]
pub fn continuations(items: &[(&str, f64, bool)]) -> Generation {
    let list: Vec<serde_json::Value> = items
        .iter()
        .map(|(content, confidence, terminal)| {
            serde_json::json!({
                "content": content,
                "confidence": confidence,
                "terminal": terminal,
            })
        })
        .collect();
    Generation {
        content: serde_json::json!({ "continuations": list }).to_string(),
        confidence: None,
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 20,
            total_tokens: 30,
        },
        terminal: false,
    }
}

/// Build a generation carrying plain text content.
#[allow(dead_code)]
pub fn plain(content: &str) -> Generation {
    Generation {
        content: content.to_string(),
        confidence: None,
        usage: TokenUsage::default(),
        terminal: false,
    }
}
