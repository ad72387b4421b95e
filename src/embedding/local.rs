//! Offline embedding provider.
//!
//! Captions are embedded by hashing lowercase alphanumeric tokens into a
//! fixed number of signed buckets; images by downscaling to a grayscale
//! thumbnail. Both are deterministic and need no model weights, which makes
//! this provider suitable for tests and air-gapped runs. Similarity is
//! lexical (shared caption tokens) and visual (overall intensity layout),
//! not semantic.

use image::imageops::FilterType;
use std::path::{Path, PathBuf};

use super::engine::{Embedding, EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Default number of text buckets, matching CLIP's width.
pub const DEFAULT_TEXT_DIMENSION: usize = 512;

/// Default thumbnail edge; image vectors have `size * size` dimensions.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 16;

/// Largest thumbnail edge settings accept.
pub const MAX_THUMBNAIL_SIZE: u32 = 1024;

#[derive(Debug, Clone)]
pub struct LocalEmbeddingProvider {
    text_dimension: usize,
    thumbnail_size: u32,
}

impl LocalEmbeddingProvider {
    /// Creates a provider. Zero sizes are raised to one.
    pub fn new(text_dimension: usize, thumbnail_size: u32) -> Self {
        Self {
            text_dimension: text_dimension.max(1),
            thumbnail_size: thumbnail_size.max(1),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TEXT_DIMENSION, DEFAULT_THUMBNAIL_SIZE)
    }

    /// Embeds a single text.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut values = vec![0.0f32; self.text_dimension];

        for token in tokenize(text) {
            let hash = simple_hash(&token);
            let bucket = (hash % self.text_dimension as u64) as usize;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
        }

        Embedding::new(values).normalized()
    }

    /// Embeds a single image file.
    pub fn embed_image(&self, path: &Path) -> EmbeddingResult<Embedding> {
        if !path.is_file() {
            return Err(EmbeddingError::ImageNotFound(path.to_path_buf()));
        }

        let image = image::open(path).map_err(|e| EmbeddingError::ImageDecode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let size = self.thumbnail_size;
        let thumbnail = image.resize_exact(size, size, FilterType::Triangle).to_luma8();
        let values = thumbnail
            .into_raw()
            .into_iter()
            .map(|p| p as f32 / 255.0)
            .collect();

        Ok(Embedding::new(values).normalized())
    }
}

impl Default for LocalEmbeddingProvider {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn text_dimension(&self) -> usize {
        self.text_dimension
    }

    fn image_dimension(&self) -> usize {
        let size = self.thumbnail_size as usize;
        size * size
    }

    fn embed_texts(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn embed_images(&self, paths: &[PathBuf]) -> EmbeddingResult<Vec<Embedding>> {
        paths.iter().map(|p| self.embed_image(p)).collect()
    }
}

/// Splits text into lowercase alphanumeric tokens.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Simple non-cryptographic hash (djb2).
fn simple_hash(text: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in text.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}
