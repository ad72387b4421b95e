//! Per-modality nearest-neighbour search.

use std::path::Path;
use std::sync::Arc;

use crate::domain::{Modality, QueryResult};
use crate::embedding::{ensure_count, Embedding, EmbeddingProvider, EmbeddingResult};
use crate::index::{StoreResult, VectorIndex};

/// Searches a collection by text or by image.
///
/// A query that cannot be embedded yields no results rather than an error;
/// store failures are returned to the caller.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Up to `k` records whose caption is closest to `query`.
    pub async fn search_text(
        &self,
        collection: &str,
        query: &str,
        k: usize,
    ) -> StoreResult<Vec<QueryResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = match self.embed_one_text(query) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to embed text query");
                return Ok(Vec::new());
            }
        };

        let results = self
            .index
            .search(collection, Modality::Text, &vector, k)
            .await?;
        tracing::debug!(collection, k, hits = results.len(), "Text search");
        Ok(results)
    }

    /// Up to `k` records whose image is closest to the image at `query`.
    pub async fn search_image(
        &self,
        collection: &str,
        query: &Path,
        k: usize,
    ) -> StoreResult<Vec<QueryResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if !query.is_file() {
            tracing::warn!(path = %query.display(), "Query image not found");
            return Ok(Vec::new());
        }

        let vector = match self.embed_one_image(query) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(path = %query.display(), error = %e, "Failed to embed query image");
                return Ok(Vec::new());
            }
        };

        let results = self
            .index
            .search(collection, Modality::Image, &vector, k)
            .await?;
        tracing::debug!(collection, k, hits = results.len(), "Image search");
        Ok(results)
    }

    fn embed_one_text(&self, query: &str) -> EmbeddingResult<Embedding> {
        let mut vectors = self.embedder.embed_texts(&[query.to_string()])?;
        ensure_count(1, &vectors)?;
        Ok(vectors.swap_remove(0))
    }

    fn embed_one_image(&self, query: &Path) -> EmbeddingResult<Embedding> {
        let mut vectors = self.embedder.embed_images(&[query.to_path_buf()])?;
        ensure_count(1, &vectors)?;
        Ok(vectors.swap_remove(0))
    }
}
