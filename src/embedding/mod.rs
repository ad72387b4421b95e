//! Text and image embeddings.
//!
//! This module turns captions, queries and images into vectors for the index.
//!
//! # Architecture
//!
//! - [`EmbeddingProvider`] - Batch text/image embedding, one space per modality
//! - [`ClipEmbeddingProvider`] - CLIP ViT-B/32 run locally with Candle
//! - [`LocalEmbeddingProvider`] - Deterministic hashing/thumbnail embeddings
//! - [`Embedding`] - A vector representation of text or image semantics
//!
//! # Example
//!
//! ```ignore
//! use medrag::embedding::{EmbeddingProvider, LocalEmbeddingProvider};
//!
//! let provider = LocalEmbeddingProvider::with_defaults();
//! let vectors = provider.embed_texts(&["chest x-ray".to_string()])?;
//! ```

mod clip;
mod engine;
mod local;
mod models;

use std::sync::Arc;

pub use clip::ClipEmbeddingProvider;
pub use engine::{Embedding, EmbeddingError, EmbeddingProvider, EmbeddingResult};
pub use local::{
    LocalEmbeddingProvider, DEFAULT_TEXT_DIMENSION, DEFAULT_THUMBNAIL_SIZE, MAX_THUMBNAIL_SIZE,
};
pub use models::{ModelInfo, ModelType};

#[cfg(test)]
pub use engine::MockEmbeddingProvider;

pub(crate) use engine::ensure_count;

use crate::config::EmbeddingSettings;

/// Builds the provider selected in settings.
///
/// Loading CLIP may download weights on first use, so call this once at
/// startup and share the result.
pub fn provider_from_settings(
    settings: &EmbeddingSettings,
) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    let info = ModelInfo::for_model(settings.model);
    tracing::info!(model = %info.name, size = %info.size_human(), "Initializing embedding provider");

    match settings.model {
        ModelType::ClipVitB32 => Ok(Arc::new(ClipEmbeddingProvider::load(
            settings.model,
            settings.use_gpu,
        )?)),
        ModelType::LocalHashing => Ok(Arc::new(LocalEmbeddingProvider::new(
            settings.text_dimension,
            settings.thumbnail_size,
        ))),
    }
}
