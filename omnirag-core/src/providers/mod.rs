//! LLM provider implementations.
//!
//! Provides concrete implementations of the `LlmProvider` trait for
//! OpenAI-compatible APIs (OpenAI, Azure OpenAI, Ollama).
//!
//! Use `create_provider()` to instantiate the appropriate provider based on config.

pub mod openai_compat;

use crate::brain::{LlmProvider, MockLlmProvider};
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use openai_compat::OpenAiCompatibleProvider;

/// Create the LLM provider named by `config.provider`.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "openai" | "azure" | "ollama" => {
            tracing::debug!(
                provider = %config.provider,
                model = %config.model,
                "Creating OpenAI-compatible provider"
            );
            Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
        }
        "mock" => Ok(Arc::new(MockLlmProvider::new())),
        other => Err(LlmError::ApiRequest {
            message: format!("Unknown LLM provider '{}'", other),
        }),
    }
}
