use std::env;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub oracle: OracleConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub search: SearchDefaults,
    pub fork: ForkDefaults,
}

/// Oracle API configuration
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Default knobs for the thought search engine
#[derive(Debug, Clone)]
pub struct SearchDefaults {
    pub branching_factor: usize,
    pub max_depth: usize,
    pub max_thoughts: usize,
    pub prune_threshold: f64,
    pub aggregation_penalty: f64,
}

/// Confidence thresholds for fork meta-insight classification
#[derive(Debug, Clone)]
pub struct ForkDefaults {
    pub high_confidence: f64,
    pub low_confidence: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let oracle = OracleConfig {
            api_key: env::var("ORACLE_API_KEY").map_err(|_| AppError::Config {
                message: "ORACLE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("ORACLE_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            model: env::var("ORACLE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MAX_RETRIES", 3),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 1000),
        };

        let search = SearchDefaults {
            branching_factor: env_parse("SEARCH_BRANCHING_FACTOR", 3),
            max_depth: env_parse("SEARCH_MAX_DEPTH", 5),
            max_thoughts: env_parse("SEARCH_MAX_THOUGHTS", 50),
            prune_threshold: env_parse("SEARCH_PRUNE_THRESHOLD", 0.3),
            aggregation_penalty: env_parse("SEARCH_AGGREGATION_PENALTY", 0.1),
        };

        let fork = ForkDefaults {
            high_confidence: env_parse("FORK_HIGH_CONFIDENCE", 0.75),
            low_confidence: env_parse("FORK_LOW_CONFIDENCE", 0.45),
        };

        Ok(Config {
            oracle,
            logging,
            request,
            search,
            fork,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            branching_factor: 3,
            max_depth: 5,
            max_thoughts: 50,
            prune_threshold: 0.3,
            aggregation_penalty: 0.1,
        }
    }
}

impl Default for ForkDefaults {
    fn default() -> Self {
        Self {
            high_confidence: 0.75,
            low_confidence: 0.45,
        }
    }
}
