//! Vector index trait and supporting types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Modality, QueryResult, Record};
use crate::embedding::Embedding;

/// Errors that can occur during vector index operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("{field} vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch {
        field: Modality,
        expected: usize,
        actual: usize,
    },
}

/// Result type for vector index operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Similarity function of a vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distance {
    #[default]
    Cosine,
}

/// Size and distance of one named vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorParams {
    pub size: usize,
    pub distance: Distance,
}

impl VectorParams {
    pub fn cosine(size: usize) -> Self {
        Self {
            size,
            distance: Distance::Cosine,
        }
    }
}

/// Schema of a dual-vector collection.
///
/// Every collection has exactly two vector fields, `text` and `image`, which
/// are compared independently and may differ in size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub text: VectorParams,
    pub image: VectorParams,
}

impl CollectionSchema {
    /// Cosine schema with the given text and image sizes.
    pub fn cosine(text_size: usize, image_size: usize) -> Self {
        Self {
            text: VectorParams::cosine(text_size),
            image: VectorParams::cosine(image_size),
        }
    }

    /// Parameters of the field holding the given modality.
    pub fn field(&self, modality: Modality) -> VectorParams {
        match modality {
            Modality::Text => self.text,
            Modality::Image => self.image,
        }
    }

    /// Checks a vector against the field it targets.
    pub fn check_dimension(&self, modality: Modality, vector: &Embedding) -> StoreResult<()> {
        let expected = self.field(modality).size;
        if vector.dimension() != expected {
            return Err(StoreError::DimensionMismatch {
                field: modality,
                expected,
                actual: vector.dimension(),
            });
        }
        Ok(())
    }
}

/// A store of dual-vector records with per-field nearest-neighbour search.
///
/// Upserts are atomic per record: a concurrent search never sees a record
/// with only some of its vectors written.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns the backend name (e.g., "memory", "qdrant").
    fn backend(&self) -> &str;

    async fn collection_exists(&self, name: &str) -> StoreResult<bool>;

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> StoreResult<()>;

    /// Inserts records, replacing any existing record with the same id.
    async fn upsert(&self, name: &str, records: Vec<Record>) -> StoreResult<()>;

    /// Returns up to `limit` records nearest to `query` in the given field,
    /// ordered by descending similarity.
    async fn search(
        &self,
        name: &str,
        field: Modality,
        query: &Embedding,
        limit: usize,
    ) -> StoreResult<Vec<QueryResult>>;

    async fn count(&self, name: &str) -> StoreResult<usize>;
}
