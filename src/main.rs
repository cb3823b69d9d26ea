use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mindgraph::{
    config::{Config, LogFormat},
    fork::{BranchStyle, ForkEngine, ForkParams},
    oracle::{Effort, HttpOracle},
    search::{SearchOptions, SearchStrategy, ThoughtSearchEngine},
};

#[derive(Parser)]
#[command(name = "mindgraph", version, about = "Graph-based reasoning over an LLM oracle")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Explore a problem as a graph of thoughts
    Search {
        /// The problem to reason about
        problem: String,
        /// Search strategy: breadth_first, depth_first, or best_first
        #[arg(long, default_value = "breadth_first")]
        strategy: String,
        /// Candidates per expansion (1-10)
        #[arg(long)]
        branching_factor: Option<usize>,
        /// Depth budget
        #[arg(long)]
        max_depth: Option<usize>,
        /// Node budget
        #[arg(long)]
        max_thoughts: Option<usize>,
        /// Prune threshold in [0, 1]
        #[arg(long)]
        prune_threshold: Option<f64>,
        /// Disable aggregation of similar thoughts
        #[arg(long)]
        no_aggregation: bool,
        /// Disable refinement of promising-but-flawed thoughts
        #[arg(long)]
        no_refinement: bool,
    },
    /// Fork a question into styled perspective branches
    Fork {
        /// The question to analyze
        query: String,
        /// Branch styles (defaults to all four)
        #[arg(long, value_delimiter = ',')]
        styles: Vec<String>,
        /// Effort tier: low, medium, or high
        #[arg(long, default_value = "medium")]
        effort: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "mindgraph starting");

    let oracle = Arc::new(HttpOracle::new(&config.oracle, config.request.clone())?);
    info!(base_url = %config.oracle.base_url, model = %config.oracle.model, "Oracle client initialized");

    match cli.command {
        Command::Search {
            problem,
            strategy,
            branching_factor,
            max_depth,
            max_thoughts,
            prune_threshold,
            no_aggregation,
            no_refinement,
        } => {
            let strategy: SearchStrategy = strategy
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let defaults = &config.search;
            let options = SearchOptions {
                strategy,
                branching_factor: branching_factor.unwrap_or(defaults.branching_factor),
                max_depth: max_depth.unwrap_or(defaults.max_depth),
                max_thoughts: max_thoughts.unwrap_or(defaults.max_thoughts),
                prune_threshold: prune_threshold.unwrap_or(defaults.prune_threshold),
                enable_aggregation: !no_aggregation,
                enable_refinement: !no_refinement,
                aggregation_penalty: defaults.aggregation_penalty,
                ..SearchOptions::default()
            };

            // Drain streamed events at debug level while the run proceeds
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let drain = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match serde_json::to_string(&event) {
                        Ok(json) => debug!(event = %json, "search event"),
                        Err(_) => debug!(?event, "search event"),
                    }
                }
            });

            let engine = ThoughtSearchEngine::new(oracle);
            let report = engine.run(&problem, options, Some(tx)).await?;
            let _ = drain.await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Fork {
            query,
            styles,
            effort,
        } => {
            let effort: Effort = effort.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let mut params = ForkParams::new(query).with_effort(effort);
            if !styles.is_empty() {
                let styles = styles
                    .iter()
                    .map(|s| s.parse::<BranchStyle>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| anyhow::anyhow!(e))?;
                params = params.with_styles(styles);
            }

            let engine = ForkEngine::new(oracle).with_thresholds(config.fork.clone());
            let report = engine.fork(params).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber; logs go to stderr so stdout stays
/// clean JSON for piping.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
