//! LLM integration for mailroom.
//!
//! A single OpenAI-compatible HTTP backend serves both chat completions and
//! embeddings. Pipeline stages depend only on the `LlmProvider` and
//! `EmbeddingProvider` traits, so tests swap in scripted doubles.

mod costs;
pub mod metered;
pub mod openai;
pub mod provider;

pub use metered::{Metered, TokenUsage};
pub use openai::OpenAiClient;
pub use provider::*;

use std::time::Duration;

use secrecy::SecretString;

use crate::error::LlmError;

/// Default OpenAI API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for creating an LLM client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub embedding_model: String,
    pub request_timeout: Duration,
}

/// Create a metered client from configuration.
pub fn create_client(config: &LlmConfig) -> Result<Metered<OpenAiClient>, LlmError> {
    let client = OpenAiClient::new(
        &config.base_url,
        config.api_key.clone(),
        config.model.clone(),
        config.embedding_model.clone(),
        config.request_timeout,
    )?;
    tracing::info!(
        "Using OpenAI-compatible API at {} (model: {}, embeddings: {})",
        config.base_url,
        config.model,
        config.embedding_model
    );
    Ok(Metered::new(client))
}
