//! Embedding vectors and the provider trait used by indexing and retrieval.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while embedding text or images.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("failed to decode image {path}: {message}")]
    ImageDecode { path: PathBuf, message: String },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("model download failed: {0}")]
    Download(String),

    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),

    #[error("provider returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// A vector embedding representing text or image semantics.
///
/// The dimensionality depends on the model and modality (512 for CLIP
/// ViT-B/32 text and image towers).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector.
    pub values: Vec<f32>,
}

impl Embedding {
    /// Creates a new embedding from a vector of values.
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Returns the dimensionality of this embedding.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Returns a copy scaled to unit length. Zero vectors are returned as is.
    pub fn normalized(&self) -> Self {
        let norm: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return self.clone();
        }
        Self::new(self.values.iter().map(|x| x / norm).collect())
    }

    /// Computes cosine similarity with another embedding.
    ///
    /// Returns a value between -1.0 and 1.0, where 1.0 means identical.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }

        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();

        let norm_a: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = other.values.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }
}

/// Produces text and image embeddings.
///
/// Both calls are batch-in/batch-out and order preserving: `output[i]`
/// belongs to `input[i]`. All text vectors share one space of
/// [`text_dimension`](Self::text_dimension) and all image vectors share
/// another of [`image_dimension`](Self::image_dimension).
#[cfg_attr(test, mockall::automock)]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn text_dimension(&self) -> usize;

    fn image_dimension(&self) -> usize;

    fn embed_texts(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>>;

    fn embed_images(&self, paths: &[PathBuf]) -> EmbeddingResult<Vec<Embedding>>;
}

/// Checks that a provider honoured the one-output-per-input contract.
pub(crate) fn ensure_count(expected: usize, embeddings: &[Embedding]) -> EmbeddingResult<()> {
    if embeddings.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: embeddings.len(),
        });
    }
    Ok(())
}
