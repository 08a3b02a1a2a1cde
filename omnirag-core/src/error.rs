//! Error types for the OmniRAG core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the LLM client, record store, graph service, and configuration.
//! None of these escape `ResultFusionEngine::get_rag_data`; they are recorded
//! as adapter failures and surface as "zero documents from that adapter".

use std::path::PathBuf;

/// Top-level error type for the OmniRAG core library.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the language-model client (completion and embedding calls).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Provider returned an empty response")]
    EmptyResponse,
}

/// Errors from the record store capability.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Field '{field}' does not support ranked full-text search")]
    UnsupportedField { field: String },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },
}

/// Errors from the remote graph query service.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Graph service request failed: {message}")]
    Request { message: String },

    #[error("Graph service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed graph service response: {message}")]
    MalformedResponse { message: String },

    #[error("Graph query failed: {message}")]
    QueryFailed { message: String },

    #[error("No structured query could be generated")]
    EmptyQuery,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },
}

/// A type alias for results using the top-level `RagError`.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = RagError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_store() {
        let err = RagError::Store(StoreError::UnsupportedField {
            field: "description".into(),
        });
        assert_eq!(
            err.to_string(),
            "Store error: Field 'description' does not support ranked full-text search"
        );
    }

    #[test]
    fn test_error_display_graph() {
        let err = RagError::Graph(GraphError::Status {
            status: 503,
            body: "unavailable".into(),
        });
        assert_eq!(
            err.to_string(),
            "Graph error: Graph service returned HTTP 503: unavailable"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = RagError::Timeout {
            operation: "vector search".into(),
            timeout_secs: 30,
        };
        assert_eq!(err.to_string(), "vector search timed out after 30s");
    }

    #[test]
    fn test_error_display_config() {
        let err = RagError::Config(ConfigError::EnvVarMissing {
            var: "OPENAI_API_KEY".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Environment variable not set: OPENAI_API_KEY"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RagError = io_err.into();
        assert!(matches!(err, RagError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: RagError = serde_err.into();
        assert!(matches!(err, RagError::Serialization(_)));
    }

    #[test]
    fn test_llm_error_variants() {
        let err = LlmError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 60s");

        let err = LlmError::EmptyResponse;
        assert_eq!(err.to_string(), "Provider returned an empty response");
    }
}
