//! CLIP embedding provider.
//!
//! Runs the CLIP ViT-B/32 text and vision towers locally with Candle. Both
//! towers project into the same 512-dimensional space, so captions and
//! images of similar content land close together.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use super::engine::{ensure_count, Embedding, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use super::models::ModelType;

/// Token used both as end-of-text marker and padding.
const END_OF_TEXT: &str = "<|endoftext|>";

/// Projection width of both CLIP ViT-B/32 towers.
const CLIP_DIMENSION: usize = 512;

/// CLIP model with its tokenizer, loaded once and shared across calls.
pub struct ClipEmbeddingProvider {
    model: ClipModel,
    tokenizer: Tokenizer,
    device: Device,
    model_type: ModelType,
    image_size: usize,
    pad_id: u32,
}

impl ClipEmbeddingProvider {
    /// Downloads (or reuses cached) weights and tokenizer and loads the model.
    pub fn load(model_type: ModelType, use_gpu: bool) -> EmbeddingResult<Self> {
        let (model_id, revision) = match (model_type.hf_model_id(), model_type.hf_revision()) {
            (Some(id), Some(rev)) => (id, rev),
            _ => {
                return Err(EmbeddingError::Download(format!(
                    "{model_type:?} has no downloadable weights"
                )))
            }
        };

        tracing::info!(model_id, revision, "Fetching CLIP weights");

        let api = Api::new().map_err(|e| EmbeddingError::Download(e.to_string()))?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));
        let weights = repo
            .get("model.safetensors")
            .map_err(|e| EmbeddingError::Download(e.to_string()))?;
        let tokenizer = repo
            .get("tokenizer.json")
            .map_err(|e| EmbeddingError::Download(e.to_string()))?;

        Self::from_files(&weights, &tokenizer, model_type, use_gpu)
    }

    /// Loads the model from local safetensors weights and a tokenizer file.
    pub fn from_files(
        weights: &Path,
        tokenizer: &Path,
        model_type: ModelType,
        use_gpu: bool,
    ) -> EmbeddingResult<Self> {
        let device = if use_gpu {
            Device::cuda_if_available(0)?
        } else {
            Device::Cpu
        };

        let config = ClipConfig::vit_base_patch32();
        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = ClipModel::new(vb, &config)?;

        let tokenizer =
            Tokenizer::from_file(tokenizer).map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(END_OF_TEXT)
            .ok_or_else(|| EmbeddingError::Tokenizer(format!("vocabulary lacks {END_OF_TEXT}")))?;

        tracing::info!(?device, image_size = config.image_size, "CLIP model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            model_type,
            image_size: config.image_size,
            pad_id,
        })
    }

    /// Tokenizes a batch into a padded `(batch, seq)` tensor of ids.
    ///
    /// Sequences longer than the text tower's context are cut short but keep
    /// a trailing end-of-text token, which is where CLIP pools.
    fn tokenize(&self, texts: &[String]) -> EmbeddingResult<Tensor> {
        let max_len = self.model_type.max_seq_length();
        let mut batch = Vec::with_capacity(texts.len());

        for text in texts {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
            let mut ids = encoding.get_ids().to_vec();
            if ids.len() > max_len {
                ids.truncate(max_len - 1);
                ids.push(self.pad_id);
            }
            batch.push(ids);
        }

        let longest = batch.iter().map(Vec::len).max().unwrap_or(0);
        for ids in batch.iter_mut() {
            ids.resize(longest, self.pad_id);
        }

        Ok(Tensor::new(batch, &self.device)?)
    }

    /// Loads an image as a normalized `(3, size, size)` tensor in [-1, 1].
    fn load_image(&self, path: &Path) -> EmbeddingResult<Tensor> {
        if !path.is_file() {
            return Err(EmbeddingError::ImageNotFound(path.to_path_buf()));
        }

        let size = self.image_size as u32;
        let pixels = image::open(path)
            .map_err(|e| EmbeddingError::ImageDecode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
            .resize_to_fill(size, size, FilterType::Triangle)
            .to_rgb8()
            .into_raw();

        let tensor = Tensor::from_vec(pixels, (self.image_size, self.image_size, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(2. / 255., -1.)?;
        Ok(tensor)
    }
}

impl EmbeddingProvider for ClipEmbeddingProvider {
    fn name(&self) -> &'static str {
        "clip"
    }

    fn text_dimension(&self) -> usize {
        CLIP_DIMENSION
    }

    fn image_dimension(&self) -> usize {
        CLIP_DIMENSION
    }

    fn embed_texts(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input_ids = self.tokenize(texts)?;
        let features = self.model.get_text_features(&input_ids)?;
        let embeddings: Vec<Embedding> = features
            .to_vec2::<f32>()?
            .into_iter()
            .map(Embedding::new)
            .collect();

        ensure_count(texts.len(), &embeddings)?;
        tracing::debug!(count = embeddings.len(), "Embedded captions");
        Ok(embeddings)
    }

    fn embed_images(&self, paths: &[PathBuf]) -> EmbeddingResult<Vec<Embedding>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let images = paths
            .iter()
            .map(|p| self.load_image(p))
            .collect::<EmbeddingResult<Vec<_>>>()?;
        let batch = Tensor::stack(&images, 0)?;
        let features = self.model.get_image_features(&batch)?;
        let embeddings: Vec<Embedding> = features
            .to_vec2::<f32>()?
            .into_iter()
            .map(Embedding::new)
            .collect();

        ensure_count(paths.len(), &embeddings)?;
        tracing::debug!(count = embeddings.len(), "Embedded images");
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_local_model() {
        let err = ClipEmbeddingProvider::load(ModelType::LocalHashing, false)
            .err()
            .unwrap();
        assert!(matches!(err, EmbeddingError::Download(_)));
    }

    #[test]
    fn from_files_reports_missing_weights() {
        let result = ClipEmbeddingProvider::from_files(
            Path::new("/nonexistent/model.safetensors"),
            Path::new("/nonexistent/tokenizer.json"),
            ModelType::ClipVitB32,
            false,
        );
        assert!(result.is_err());
    }
}
