use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Run failed: {message}")]
    RunFailed { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Structural violations in the reasoning graph.
///
/// These are rejected synchronously before anything is persisted.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Unknown parent {parent_id} declared by node {node_id}")]
    UnknownParent { node_id: String, parent_id: String },

    #[error("Unknown edge endpoint: {node_id}")]
    UnknownEndpoint { node_id: String },

    #[error("Self-loop rejected on node {node_id}")]
    SelfLoop { node_id: String },

    #[error("Aggregation node requires at least 2 parents, got {got}")]
    AggregationArity { got: usize },
}

/// Oracle transport and protocol errors.
///
/// All variants are transient from the engines' point of view: the search
/// loop records them and continues, and a fork branch degrades rather than
/// aborting the run.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for graph store operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Validation {
            field: "styles".to_string(),
            reason: "cannot be empty".to_string(),
        };
        assert_eq!(err.to_string(), "Validation failed: styles - cannot be empty");

        let err = AppError::RunFailed {
            message: "every thought failed".to_string(),
        };
        assert_eq!(err.to_string(), "Run failed: every thought failed");
    }

    #[test]
    fn test_graph_error_display() {
        let err = GraphError::UnknownParent {
            node_id: "n-2".to_string(),
            parent_id: "n-9".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown parent n-9 declared by node n-2");

        let err = GraphError::SelfLoop {
            node_id: "n-1".to_string(),
        };
        assert_eq!(err.to_string(), "Self-loop rejected on node n-1");

        let err = GraphError::AggregationArity { got: 1 };
        assert_eq!(
            err.to_string(),
            "Aggregation node requires at least 2 parents, got 1"
        );
    }

    #[test]
    fn test_oracle_error_display() {
        let err = OracleError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Oracle unavailable: server down (retries: 3)");

        let err = OracleError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = OracleError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_graph_error_conversion_to_app_error() {
        let graph_err = GraphError::NodeNotFound {
            node_id: "missing".to_string(),
        };
        let app_err: AppError = graph_err.into();
        assert!(matches!(app_err, AppError::Graph(_)));
    }

    #[test]
    fn test_oracle_error_conversion_to_app_error() {
        let oracle_err = OracleError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = oracle_err.into();
        assert!(matches!(app_err, AppError::Oracle(_)));
    }
}
