//! Embedding model definitions.
//!
//! This module defines the embedding backends that can populate and query a
//! collection, with the dimensions each one produces.

use serde::{Deserialize, Serialize};

/// Available embedding model types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// CLIP ViT-B/32: shared text/image space, 512 dimensions per tower.
    #[default]
    ClipVitB32,
    /// Offline hashing (text) and thumbnail (image) embeddings.
    LocalHashing,
}

impl ModelType {
    /// Returns the Hugging Face model ID, if the model is downloaded.
    pub fn hf_model_id(&self) -> Option<&'static str> {
        match self {
            Self::ClipVitB32 => Some("openai/clip-vit-base-patch32"),
            Self::LocalHashing => None,
        }
    }

    /// Returns the repository revision carrying safetensors weights.
    pub fn hf_revision(&self) -> Option<&'static str> {
        match self {
            Self::ClipVitB32 => Some("refs/pr/15"),
            Self::LocalHashing => None,
        }
    }

    /// Returns the maximum token sequence length of the text tower.
    pub fn max_seq_length(&self) -> usize {
        match self {
            Self::ClipVitB32 => 77,
            Self::LocalHashing => usize::MAX,
        }
    }

    /// Returns whether inference runs without downloaded weights.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalHashing)
    }
}

/// Information about a model.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model type.
    pub model_type: ModelType,
    /// Human-readable name.
    pub name: String,
    /// Description of the model.
    pub description: String,
    /// Approximate download size in bytes.
    pub size_bytes: u64,
}

impl ModelInfo {
    /// Creates info for a model type.
    pub fn for_model(model_type: ModelType) -> Self {
        let (name, description, size_bytes) = match model_type {
            ModelType::ClipVitB32 => (
                "CLIP ViT-B/32",
                "Contrastive text/image model with a shared embedding space",
                605_000_000,
            ),
            ModelType::LocalHashing => (
                "Local hashing",
                "Token hashing for captions, grayscale thumbnails for images",
                0,
            ),
        };

        Self {
            model_type,
            name: name.to_string(),
            description: description.to_string(),
            size_bytes,
        }
    }

    /// Returns the size as a human-readable string.
    pub fn size_human(&self) -> String {
        let mb = self.size_bytes as f64 / 1_000_000.0;
        format!("{:.1} MB", mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_model_properties() {
        let model = ModelType::ClipVitB32;
        assert_eq!(model.hf_model_id(), Some("openai/clip-vit-base-patch32"));
        assert_eq!(model.hf_revision(), Some("refs/pr/15"));
        assert_eq!(model.max_seq_length(), 77);
        assert!(!model.is_local());
    }

    #[test]
    fn local_model_needs_no_download() {
        let model = ModelType::LocalHashing;
        assert!(model.is_local());
        assert_eq!(model.hf_model_id(), None);
        assert_eq!(ModelInfo::for_model(model).size_human(), "0.0 MB");
    }

    #[test]
    fn default_model_is_clip() {
        assert_eq!(ModelType::default(), ModelType::ClipVitB32);
    }

    #[test]
    fn model_info() {
        let info = ModelInfo::for_model(ModelType::ClipVitB32);
        assert_eq!(info.name, "CLIP ViT-B/32");
        assert!(info.size_human().contains("MB"));
    }

    #[test]
    fn model_serialization() {
        let json = serde_json::to_string(&ModelType::LocalHashing).unwrap();
        assert_eq!(json, "\"local_hashing\"");

        let deserialized: ModelType = serde_json::from_str("\"clip_vit_b32\"").unwrap();
        assert_eq!(deserialized, ModelType::ClipVitB32);
    }
}
