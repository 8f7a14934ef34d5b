//! Usage metering decorator. Wraps a provider and tallies tokens and cost.

use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, EmbeddingProvider, EmbeddingResponse, LlmProvider,
};

/// Token usage accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenUsage {
    pub completion_calls: u32,
    pub embedding_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub embedding_tokens: u64,
    pub estimated_cost: Decimal,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.embedding_tokens
    }
}

/// Provider wrapper that records usage of every successful call.
pub struct Metered<P> {
    inner: P,
    usage: Mutex<TokenUsage>,
}

impl<P> Metered<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Snapshot of usage so far.
    pub fn usage(&self) -> TokenUsage {
        self.usage
            .lock()
            .map(|u| u.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn record(&self, f: impl FnOnce(&mut TokenUsage)) {
        let mut guard = self
            .usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }
}

#[async_trait]
impl<P: LlmProvider> LlmProvider for Metered<P> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        self.inner.cost_per_token()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self.inner.complete(request).await?;
        let (input_price, output_price) = self.inner.cost_per_token();
        self.record(|u| {
            u.completion_calls += 1;
            u.input_tokens += u64::from(response.input_tokens);
            u.output_tokens += u64::from(response.output_tokens);
            u.estimated_cost += input_price * Decimal::from(response.input_tokens)
                + output_price * Decimal::from(response.output_tokens);
        });
        Ok(response)
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for Metered<P> {
    fn embedding_model(&self) -> &str {
        self.inner.embedding_model()
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingResponse, LlmError> {
        let response = self.inner.embed(inputs).await?;
        let price = costs::embedding_cost_per_token(self.inner.embedding_model());
        self.record(|u| {
            u.embedding_calls += 1;
            u.embedding_tokens += u64::from(response.input_tokens);
            u.estimated_cost += price * Decimal::from(response.input_tokens);
        });
        Ok(response)
    }
}
