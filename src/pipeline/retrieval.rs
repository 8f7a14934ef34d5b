//! Embedding index over the catalog for inquiry retrieval.
//!
//! Each product's document text is split into overlapping character chunks,
//! all chunks are embedded in one batch, and a product scores as its best
//! chunk. The index is built once and never mutated afterwards.

use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::LlmError;
use crate::llm::EmbeddingProvider;

/// Chunking and ranking knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Number of products to return.
    pub top_k: usize,
    /// Hits must score strictly above this.
    pub min_score: f32,
    /// Chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks. Always below `chunk_size`.
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.0,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// One embedded chunk.
#[derive(Debug, Clone)]
struct IndexEntry {
    /// Position of the product in catalog order.
    product: usize,
    product_id: String,
    vector: Vec<f32>,
}

/// A ranked hit: catalog position, product id, similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub product_id: String,
    pub score: f32,
}

/// Read-only vector index over catalog products.
#[derive(Debug, Clone)]
pub struct ProductIndex {
    entries: Vec<IndexEntry>,
    config: RetrievalConfig,
}

impl ProductIndex {
    /// Embed every product in the catalog.
    pub async fn build(
        catalog: &Catalog,
        embedder: &Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Result<Self, LlmError> {
        let mut owners = Vec::new();
        let mut texts = Vec::new();
        for (position, product) in catalog.products().iter().enumerate() {
            for chunk in chunk_text(
                &product.document_text(),
                config.chunk_size,
                config.chunk_overlap,
            ) {
                owners.push((position, product.id.clone()));
                texts.push(chunk);
            }
        }

        let response = embedder.embed(&texts).await?;
        if response.vectors.len() != texts.len() {
            return Err(LlmError::InvalidResponse {
                provider: embedder.embedding_model().to_string(),
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    response.vectors.len()
                ),
            });
        }

        let entries: Vec<IndexEntry> = owners
            .into_iter()
            .zip(response.vectors)
            .map(|((product, product_id), vector)| IndexEntry {
                product,
                product_id,
                vector,
            })
            .collect();

        info!(
            products = catalog.len(),
            chunks = entries.len(),
            model = embedder.embedding_model(),
            "Built product index"
        );
        Ok(Self { entries, config })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embed `query` and rank products against it.
    pub async fn search(
        &self,
        query: &str,
        embedder: &Arc<dyn EmbeddingProvider>,
    ) -> Result<Vec<SearchHit>, LlmError> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let response = embedder.embed(&[query.to_string()]).await?;
        let vector = response
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: embedder.embedding_model().to_string(),
                reason: "no embedding returned for query".to_string(),
            })?;
        Ok(self.rank(&vector))
    }

    /// Rank products by their best chunk similarity to `query`.
    ///
    /// Most similar first; equal scores keep catalog order.
    pub fn rank(&self, query: &[f32]) -> Vec<SearchHit> {
        let mut best: Vec<SearchHit> = Vec::new();
        for entry in &self.entries {
            let score = cosine_similarity(query, &entry.vector);
            match best.iter_mut().find(|h| h.position == entry.product) {
                Some(hit) if score > hit.score => hit.score = score,
                Some(_) => {}
                None => best.push(SearchHit {
                    position: entry.product,
                    product_id: entry.product_id.clone(),
                    score,
                }),
            }
        }

        best.retain(|h| h.score > self.config.min_score);
        best.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.position.cmp(&b.position))
        });
        best.truncate(self.config.top_k);

        debug!(
            hits = ?best.iter().map(|h| (&h.product_id, h.score)).collect::<Vec<_>>(),
            "Ranked products"
        );
        best
    }
}

/// Cosine similarity; zero when either vector has no magnitude or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Split text into windows of `size` chars, consecutive windows sharing `overlap` chars.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size || size == 0 {
        return vec![text.to_string()];
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
