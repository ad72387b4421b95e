//! Local multimodal models served by Ollama.
//!
//! Ollama exposes an OpenAI-compatible API, so this is a thin wrapper
//! around OpenAiCompatibleProvider with Ollama-specific defaults.

use super::openai::OpenAiCompatibleProvider;
use super::traits::{CompletionRequest, CompletionResponse, LlmProvider, LlmResult};
use async_trait::async_trait;

/// Default Ollama API URL.
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434/v1";

/// Context lengths for common Ollama vision models.
fn model_context_length(model: &str) -> usize {
    match model {
        m if m.starts_with("llama4") => 131_072,
        m if m.starts_with("llama3.2-vision") => 128_000,
        m if m.starts_with("llava-llama3") => 8_192,
        m if m.starts_with("llava") => 4_096,
        m if m.starts_with("gemma3") => 128_000,
        m if m.starts_with("qwen2.5vl") => 128_000,
        m if m.starts_with("minicpm-v") => 32_768,
        m if m.starts_with("moondream") => 2_048,
        _ => 4_096,
    }
}

/// Ollama models that accept images.
fn model_supports_vision(model: &str) -> bool {
    ["llama4", "llama3.2-vision", "llava", "gemma3", "qwen2.5vl", "minicpm-v", "moondream"]
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// A model served by a local (or LAN) Ollama instance.
///
/// Ollama serves models locally and provides an OpenAI-compatible API.
/// This provider wraps OpenAiCompatibleProvider with Ollama-specific defaults.
pub struct OllamaProvider {
    inner: OpenAiCompatibleProvider,
}

impl OllamaProvider {
    /// Creates a new Ollama provider with default localhost URL.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_url(OLLAMA_DEFAULT_URL, model)
    }

    /// Creates a new Ollama provider with a custom URL.
    pub fn with_url(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let context_length = model_context_length(&model);
        let vision = model_supports_vision(&model);

        let inner = OpenAiCompatibleProvider::custom(base_url, None, model)
            .with_context_length(context_length)
            .with_vision(vision);

        Self { inner }
    }

    /// Creates a provider with the llava model.
    pub fn llava() -> Self {
        Self::new("llava")
    }

    /// Creates a provider with the llama3.2-vision model.
    pub fn llama3_vision() -> Self {
        Self::new("llama3.2-vision")
    }

    /// Overrides the context length.
    pub fn with_context_length(mut self, length: usize) -> Self {
        self.inner = self.inner.with_context_length(length);
        self
    }

    /// Overrides the HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.inner = self.inner.with_client(client);
        self
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        self.inner.complete(request).await
    }

    fn supports_vision(&self) -> bool {
        self.inner.supports_vision()
    }

    fn max_context_length(&self) -> usize {
        self.inner.max_context_length()
    }
}
