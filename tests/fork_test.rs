//! Integration tests for the branch analysis engine.

mod common;

use std::sync::Arc;

use common::{plain, MockOracle};
use mindgraph::error::{AppError, OracleError};
use mindgraph::fork::{BranchStyle, ForkEngine, ForkParams};
use mindgraph::oracle::Effort;

fn styled_payload(prompt: &str) -> serde_json::Value {
    let (conclusion, confidence) = if prompt.contains("CONSERVATIVE") {
        ("keep the current system and add monitoring", 0.9)
    } else if prompt.contains("AGGRESSIVE") {
        ("rewrite the system now while traffic is low", 0.6)
    } else if prompt.contains("BALANCED") {
        ("keep the system but rewrite the storage module", 0.8)
    } else {
        ("the system is not the actual bottleneck", 0.4)
    };
    serde_json::json!({
        "conclusion": conclusion,
        "confidence": confidence,
        "insights": ["one insight"],
        "risks": ["one risk"],
        "opportunities": [],
        "assumptions": ["traffic stays flat"],
    })
}

#[tokio::test]
async fn fork_runs_one_branch_per_style_in_request_order() {
    let oracle = Arc::new(MockOracle::new(
        |_, prompt| Ok(plain(&styled_payload(prompt).to_string())),
        |_, _| Ok(0.5),
    ));
    let engine = ForkEngine::new(Arc::clone(&oracle));

    let report = engine
        .fork(ForkParams::new("should we rewrite the system?"))
        .await
        .unwrap();

    assert_eq!(oracle.generate_calls(), 4);
    let styles: Vec<BranchStyle> = report.branches.iter().map(|b| b.style).collect();
    assert_eq!(styles, BranchStyle::all().to_vec());
    assert!(report.branches.iter().all(|b| b.succeeded()));
    assert_eq!(report.recommended_approach, Some(BranchStyle::Conservative));
    assert_eq!(report.branches[0].insights, vec!["one insight"]);
    assert!(!report.meta_insight.is_empty());
}

#[tokio::test]
async fn failed_branch_degrades_without_blocking_the_others() {
    let oracle = Arc::new(MockOracle::new(
        |_, prompt| {
            if prompt.contains("CONTRARIAN") {
                Err(OracleError::Timeout { timeout_ms: 10 })
            } else {
                Ok(plain(&styled_payload(prompt).to_string()))
            }
        },
        |_, _| Ok(0.5),
    ));
    let engine = ForkEngine::new(oracle);

    let report = engine
        .fork(ForkParams::new("should we rewrite the system?"))
        .await
        .unwrap();

    let failed = report.branch(BranchStyle::Contrarian).unwrap();
    assert!(!failed.succeeded());
    assert_eq!(failed.confidence, 0.0);
    assert!(failed.insights.is_empty());
    assert!(failed.error.as_deref().unwrap().contains("timeout"));

    // The other three settled normally and drive the analysis
    assert_eq!(report.branches.iter().filter(|b| b.succeeded()).count(), 3);
    assert_ne!(report.recommended_approach, Some(BranchStyle::Contrarian));
}

#[tokio::test]
async fn all_failed_fork_reports_failure_in_the_meta_insight() {
    let oracle = Arc::new(MockOracle::new(
        |_, _| {
            Err(OracleError::Unavailable {
                message: "oracle down".to_string(),
                retries: 3,
            })
        },
        |_, _| Ok(0.5),
    ));
    let engine = ForkEngine::new(oracle);

    let report = engine
        .fork(ForkParams::new("should we rewrite the system?"))
        .await
        .unwrap();

    assert!(report.meta_insight.contains("All 4 branches failed"));
    assert!(report.recommended_approach.is_none());
    assert!(report.convergence_points.is_empty());
    assert!(report.divergence_points.is_empty());
    for branch in &report.branches {
        assert!(!branch.error.as_deref().unwrap().is_empty());
        assert!(branch.conclusion.is_empty());
    }
}

#[tokio::test]
async fn convergence_and_divergence_are_computed_over_succeeded_branches() {
    let oracle = Arc::new(MockOracle::new(
        |_, prompt| {
            let conclusion = if prompt.contains("CONSERVATIVE") {
                "invest in caching before anything else"
            } else {
                "invest in caching and then sharding"
            };
            Ok(plain(
                &serde_json::json!({ "conclusion": conclusion, "confidence": 0.8 }).to_string(),
            ))
        },
        |_, _| Ok(0.5),
    ));
    let engine = ForkEngine::new(oracle);

    let report = engine
        .fork(
            ForkParams::new("where should the next quarter go?").with_styles(vec![
                BranchStyle::Conservative,
                BranchStyle::Aggressive,
            ]),
        )
        .await
        .unwrap();

    let full_topics: Vec<&str> = report
        .convergence_points
        .iter()
        .map(|c| c.topic.as_str())
        .collect();
    assert!(full_topics.contains(&"caching"));
    assert!(full_topics.contains(&"invest"));

    let contested: Vec<&str> = report
        .divergence_points
        .iter()
        .map(|d| d.topic.as_str())
        .collect();
    assert!(contested.contains(&"sharding"));
}

#[tokio::test]
async fn guidance_is_applied_and_validated() {
    let oracle = Arc::new(MockOracle::new(
        |_, prompt| {
            if prompt.contains("CONSERVATIVE") {
                assert!(prompt.contains("assume zero budget"));
            }
            Ok(plain(&styled_payload(prompt).to_string()))
        },
        |_, _| Ok(0.5),
    ));
    let engine = ForkEngine::new(Arc::clone(&oracle));

    let report = engine
        .fork(
            ForkParams::new("should we rewrite the system?")
                .with_effort(Effort::High)
                .with_guidance(BranchStyle::Conservative, "assume zero budget"),
        )
        .await
        .unwrap();
    assert!(report.applied_guidance.is_some());

    // Guidance naming a style outside the fork is rejected before any call
    let calls_before = oracle.generate_calls();
    let err = engine
        .fork(
            ForkParams::new("q")
                .with_styles(vec![BranchStyle::Balanced])
                .with_guidance(BranchStyle::Aggressive, "go faster"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(oracle.generate_calls(), calls_before);
}
