//! AI/LLM provider implementations.
//!
//! This module provides a unified interface for chat completion providers
//! that accept text and image content.
//!
//! # Supported Providers
//!
//! - **OpenAI-compatible**: OpenAI, Groq, vLLM, LM Studio and other compatible endpoints
//! - **Ollama**: Local multimodal models (llava, llama3.2-vision, ...)
//!
//! # Example
//!
//! ```rust,no_run
//! use medrag::providers::ai::{
//!     CompletionRequest, ContentPart, LlmProvider, Message, OpenAiCompatibleProvider,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let groq = OpenAiCompatibleProvider::groq("gsk-...", "meta-llama/llama-4-scout-17b-16e-instruct");
//!
//! let message = Message::user("Describe this scan.")
//!     .with_part(ContentPart::image("image/jpeg", "<base64>"));
//! let request = CompletionRequest::new(vec![message]).with_max_tokens(600);
//!
//! let response = groq.complete(&request).await?;
//! println!("Response: {}", response.text);
//! # Ok(())
//! # }
//! ```

mod ollama;
mod openai;
mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use ollama::{OllamaProvider, OLLAMA_DEFAULT_URL};
pub use openai::{OpenAiCompatibleProvider, GROQ_BASE_URL};
pub use traits::{
    CompletionRequest, CompletionResponse, ContentPart, FinishReason, LlmError, LlmProvider,
    LlmResult, Message, Role, TokenUsage,
};

use crate::config::{GenerationSettings, ProviderKind};

/// Builds the provider selected in settings.
///
/// Hosted providers need `api_key`; Ollama and custom endpoints may run
/// without one.
pub fn provider_from_settings(
    settings: &GenerationSettings,
    api_key: Option<String>,
) -> LlmResult<Arc<dyn LlmProvider>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()?;
    let model = settings.model.clone();

    let require_key = |key: Option<String>| {
        key.ok_or_else(|| {
            LlmError::Unavailable(format!(
                "no API key for {}: set {} or store one in the keychain",
                settings.provider.as_str(),
                settings.api_key_env.as_deref().unwrap_or("an environment variable"),
            ))
        })
    };

    let provider: Arc<dyn LlmProvider> = match settings.provider {
        ProviderKind::Groq | ProviderKind::OpenAi => {
            let key = require_key(api_key)?;
            let mut provider = if settings.provider == ProviderKind::Groq {
                OpenAiCompatibleProvider::groq(key, model)
            } else {
                OpenAiCompatibleProvider::openai(key, model)
            };
            if let Some(url) = &settings.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Arc::new(provider.with_client(client))
        }
        ProviderKind::Ollama => {
            let url = settings.base_url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
            Arc::new(OllamaProvider::with_url(url, model).with_client(client))
        }
        ProviderKind::Custom => {
            let url = settings.base_url.as_deref().ok_or_else(|| {
                LlmError::Unavailable("custom provider requires base_url".to_string())
            })?;
            Arc::new(OpenAiCompatibleProvider::custom(url, api_key, model).with_client(client))
        }
    };

    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        vision = provider.supports_vision(),
        "Initialized generation provider"
    );
    Ok(provider)
}
