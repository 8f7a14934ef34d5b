//! Inquiry handling: retrieve the catalog entries most relevant to an email.

use std::sync::Arc;

use tracing::info;

use crate::catalog::Catalog;
use crate::error::{PipelineError, Stage};
use crate::llm::EmbeddingProvider;
use crate::mail::Email;
use crate::pipeline::retrieval::{ProductIndex, RetrievalConfig};
use crate::pipeline::types::RetrievedProduct;

/// Answers product inquiries from an embedding index over the catalog.
///
/// The index is built on the first inquiry and reused for the rest of the run.
/// Product text never changes during a run, only stock does, so hits are
/// re-read from the live catalog.
pub struct InquiryHandler {
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    index: Option<ProductIndex>,
}

impl InquiryHandler {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            config,
            index: None,
        }
    }

    pub fn index_built(&self) -> bool {
        self.index.is_some()
    }

    /// Products relevant to `email`, most similar first. May be empty.
    pub async fn retrieve(
        &mut self,
        email: &Email,
        catalog: &Catalog,
    ) -> Result<Vec<RetrievedProduct>, PipelineError> {
        let index = match self.index.take() {
            Some(index) => index,
            None => ProductIndex::build(catalog, &self.embedder, self.config.clone())
                .await
                .map_err(|e| PipelineError::service(Stage::Retrieval, e))?,
        };
        let index = self.index.insert(index);

        let hits = index
            .search(&email.text(), &self.embedder)
            .await
            .map_err(|e| PipelineError::service(Stage::Retrieval, e))?;

        let products: Vec<RetrievedProduct> = hits
            .into_iter()
            .filter_map(|hit| {
                catalog.get(&hit.product_id).map(|p| RetrievedProduct {
                    product: p.clone(),
                    score: hit.score,
                })
            })
            .collect();

        info!(
            email_id = %email.id,
            hits = products.len(),
            top = products.first().map(|p| p.product.id.as_str()).unwrap_or("-"),
            "Inquiry products retrieved"
        );
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use crate::error::LlmError;
    use crate::llm::EmbeddingResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Two-word vocabulary; counts embed calls.
    struct CountingEmbedder {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn embedding_model(&self) -> &str {
            "counting"
        }

        async fn embed(&self, inputs: &[String]) -> Result<EmbeddingResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::RateLimited {
                    provider: "mock".into(),
                    retry_after: None,
                });
            }
            let vectors = inputs
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.matches("scarf").count() as f32,
                        t.matches("boots").count() as f32,
                    ]
                })
                .collect();
            Ok(EmbeddingResponse {
                vectors,
                input_tokens: 10,
            })
        }
    }

    fn embedder(fail: bool) -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            calls: AtomicU32::new(0),
            fail,
        })
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for (id, name, stock) in [("SCF01", "Silk Scarf", 7), ("BTS02", "Chelsea Boots", 2)] {
            catalog
                .insert(Product {
                    id: id.into(),
                    name: name.into(),
                    category: "Accessories".into(),
                    description: format!("A lovely {}", name.to_lowercase()),
                    season: "Winter".into(),
                    stock,
                })
                .unwrap();
        }
        catalog
    }

    fn inquiry(id: &str, body: &str) -> Email {
        Email {
            id: id.into(),
            subject: String::new(),
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn index_is_built_once() {
        let embedder = embedder(false);
        let mut handler = InquiryHandler::new(embedder.clone(), RetrievalConfig::default());
        let catalog = catalog();
        assert!(!handler.index_built());

        let first = handler
            .retrieve(&inquiry("E1", "Is the scarf warm?"), &catalog)
            .await
            .unwrap();
        assert_eq!(first[0].product.id, "SCF01");
        assert!(handler.index_built());

        let second = handler
            .retrieve(&inquiry("E2", "Do the boots run small?"), &catalog)
            .await
            .unwrap();
        assert_eq!(second[0].product.id, "BTS02");

        // One build call plus one query call per inquiry.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hits_reflect_live_stock() {
        let mut handler = InquiryHandler::new(embedder(false), RetrievalConfig::default());
        let mut catalog = catalog();
        handler
            .retrieve(&inquiry("E1", "scarf"), &catalog)
            .await
            .unwrap();

        catalog.reserve("SCF01", 5);
        let hits = handler
            .retrieve(&inquiry("E2", "scarf"), &catalog)
            .await
            .unwrap();
        assert_eq!(hits[0].product.stock, 2);
    }

    #[tokio::test]
    async fn unrelated_inquiry_returns_nothing() {
        let mut handler = InquiryHandler::new(embedder(false), RetrievalConfig::default());
        let hits = handler
            .retrieve(&inquiry("E1", "Do you sell umbrellas?"), &catalog())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_is_retrieval_service_error() {
        let mut handler = InquiryHandler::new(embedder(true), RetrievalConfig::default());
        match handler.retrieve(&inquiry("E1", "scarf"), &catalog()).await {
            Err(PipelineError::Service { stage, .. }) => assert_eq!(stage, Stage::Retrieval),
            other => panic!("Expected Service error, got {:?}", other),
        }
        assert!(!handler.index_built());
    }
}
