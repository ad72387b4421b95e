//! Application settings and configuration types.
//!
//! Settings are persisted to `~/.config/medrag/settings.json` (or XDG
//! equivalent) and loaded at startup. Every section has defaults, so a
//! settings file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dataset::{DatasetLayout, SplitLayout, ROCOV2_SPLITS};
use crate::domain::SplitName;
use crate::embedding::{
    ModelType, DEFAULT_TEXT_DIMENSION, DEFAULT_THUMBNAIL_SIZE, MAX_THUMBNAIL_SIZE,
};
use crate::storage::KeychainAccess;

/// Errors that can occur while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Source dataset and sampling.
    pub dataset: DatasetSettings,
    /// Vector index store and collection.
    pub index: IndexSettings,
    /// Embedding model selection.
    pub embedding: EmbeddingSettings,
    /// Query-time retrieval.
    pub retrieval: RetrievalSettings,
    /// Answer generation model.
    pub generation: GenerationSettings,
}

impl Settings {
    /// Returns the default settings file location.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        directories::ProjectDirs::from("io", "medrag", "medrag")
            .map(|dirs| dirs.config_dir().join("settings.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Loads and validates settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from `path`, falling back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Writes settings as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    /// Checks value ranges and endpoint URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dataset.validate()?;
        self.index.validate()?;
        self.embedding.validate()?;
        self.generation.validate()?;

        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be at least 1"));
        }
        Ok(())
    }
}

/// Source dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    /// Directory containing the caption tables and image directories.
    pub root: PathBuf,
    /// Fraction of each split's images to index, in (0, 1].
    pub sample_rate: f64,
    /// Pairs embedded per batch; bounds peak memory during indexing.
    pub batch_size: usize,
    /// Seed for the sampling draw. Without one every build draws afresh.
    pub seed: Option<u64>,
    /// Splits to scan, with paths relative to `root`.
    pub splits: Vec<SplitSettings>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/rocov2"),
            sample_rate: 0.5,
            batch_size: 50,
            seed: None,
            splits: ROCOV2_SPLITS.iter().map(|s| SplitSettings::rocov2(s)).collect(),
        }
    }
}

impl DatasetSettings {
    /// Resolves split paths against the dataset root.
    pub fn layout(&self) -> DatasetLayout {
        DatasetLayout::new(
            &self.root,
            self.splits
                .iter()
                .map(|split| SplitLayout {
                    name: SplitName::from(split.name.as_str()),
                    caption_file: self.root.join(&split.caption_file),
                    images_dir: self.root.join(&split.images_dir),
                })
                .collect(),
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            return Err(invalid(
                "dataset.sample_rate",
                format!("{} is outside (0, 1]", self.sample_rate),
            ));
        }
        if self.batch_size == 0 {
            return Err(invalid("dataset.batch_size", "must be at least 1"));
        }

        let mut seen = HashSet::new();
        for split in &self.splits {
            if split.name.trim().is_empty() {
                return Err(invalid("dataset.splits", "split name is empty"));
            }
            if !seen.insert(split.name.as_str()) {
                return Err(invalid(
                    "dataset.splits",
                    format!("split {} is listed twice", split.name),
                ));
            }
        }
        Ok(())
    }
}

/// Location of one split's caption table and images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSettings {
    /// Split name recorded on every record drawn from it.
    pub name: String,
    /// Caption table path, relative to the dataset root.
    pub caption_file: PathBuf,
    /// Images directory path, relative to the dataset root.
    pub images_dir: PathBuf,
}

impl SplitSettings {
    /// ROCOv2 naming: `<split>_captions.csv` and `<split>_images/<split>/`.
    pub fn rocov2(name: &str) -> Self {
        Self {
            name: name.to_string(),
            caption_file: PathBuf::from(format!("{name}_captions.csv")),
            images_dir: PathBuf::from(format!("{name}_images")).join(name),
        }
    }
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Collection holding the dual-vector records.
    pub collection_name: String,
    /// Which store to use.
    pub backend: StoreBackend,
    /// Request timeout for remote stores, in seconds.
    pub timeout_secs: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            collection_name: "medical_images_text".to_string(),
            backend: StoreBackend::Memory,
            timeout_secs: 30,
        }
    }
}

impl IndexSettings {
    /// Keychain entry holding the store's API key, for backends that take one.
    pub fn keychain_key(&self) -> Option<String> {
        match &self.backend {
            StoreBackend::Memory => None,
            StoreBackend::Qdrant {
                api_key_keychain_id,
                ..
            } => Some(
                api_key_keychain_id
                    .clone()
                    .unwrap_or_else(|| KeychainAccess::store_api_key("qdrant")),
            ),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.collection_name.trim().is_empty() {
            return Err(invalid("index.collection_name", "must not be empty"));
        }
        if let StoreBackend::Qdrant { url, .. } = &self.backend {
            url::Url::parse(url).map_err(|e| invalid("index.backend.url", e.to_string()))?;
        }
        Ok(())
    }
}

/// Vector store selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local store, rebuilt on every start.
    Memory,
    /// Qdrant server over REST.
    Qdrant {
        url: String,
        /// Keychain identifier for the API key, if the server requires one.
        #[serde(default)]
        api_key_keychain_id: Option<String>,
    },
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Model producing both text and image vectors.
    pub model: ModelType,
    /// Whether to use GPU acceleration if available.
    pub use_gpu: bool,
    /// Text vector size for the local model.
    pub text_dimension: usize,
    /// Thumbnail edge for the local model's image vectors.
    pub thumbnail_size: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: ModelType::default(),
            use_gpu: false,
            text_dimension: DEFAULT_TEXT_DIMENSION,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }
}

impl EmbeddingSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.text_dimension == 0 {
            return Err(invalid("embedding.text_dimension", "must be at least 1"));
        }
        if self.thumbnail_size == 0 {
            return Err(invalid("embedding.thumbnail_size", "must be at least 1"));
        }
        if self.thumbnail_size > MAX_THUMBNAIL_SIZE {
            return Err(invalid(
                "embedding.thumbnail_size",
                format!("must be at most {MAX_THUMBNAIL_SIZE}"),
            ));
        }
        Ok(())
    }
}

/// Query-time retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Results fetched per modality.
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Chat completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    /// Any OpenAI-compatible endpoint given by `base_url`.
    Custom,
}

impl ProviderKind {
    /// Name used for keychain entries and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Custom => "custom",
        }
    }
}

/// Answer generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Which chat completion backend to call.
    pub provider: ProviderKind,
    /// Endpoint override (required for `custom`).
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Environment variable holding the API key; checked before the keychain.
    pub api_key_env: Option<String>,
    /// Keychain identifier for the API key.
    pub api_key_keychain_id: Option<String>,
    /// Maximum tokens in the answer.
    pub max_tokens: usize,
    /// Sampling temperature (0.0 to 2.0).
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Instructions placed before the user's question.
    pub instructions: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Groq,
            base_url: None,
            model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            api_key_env: Some("GROQ_API_KEY".to_string()),
            api_key_keychain_id: None,
            max_tokens: 600,
            temperature: 0.7,
            timeout_secs: 60,
            instructions: "You are a radiologist with an experience of 30 years. \
                You analyse medical scans and text, and help diagnose underlying issues.\n\n\
                Please analyze the following query and image using your expertise:"
                .to_string(),
        }
    }
}

impl GenerationSettings {
    /// Keychain entry holding the provider's API key.
    pub fn keychain_key(&self) -> String {
        self.api_key_keychain_id
            .clone()
            .unwrap_or_else(|| KeychainAccess::generation_api_key(self.provider.as_str()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(invalid("generation.model", "must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("generation.max_tokens", "must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(
                "generation.temperature",
                format!("{} is outside [0, 2]", self.temperature),
            ));
        }
        match (&self.base_url, self.provider) {
            (Some(url), _) => {
                url::Url::parse(url).map_err(|e| invalid("generation.base_url", e.to_string()))?;
            }
            (None, ProviderKind::Custom) => {
                return Err(invalid(
                    "generation.base_url",
                    "required for the custom provider",
                ));
            }
            (None, _) => {}
        }
        Ok(())
    }
}
