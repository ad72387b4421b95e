//! Answer generation from a query, an optional image and retrieved context.
//!
//! [`LlmGenerator`] sends a single user message to a chat completion
//! provider. The message carries, in order:
//!
//! 1. the instructions followed by the user's question
//! 2. the user's image, inlined as base64 (if one was given)
//! 3. a reference block listing each retrieved caption and its source file
//!
//! Retrieved images are cited by file name only; their pixels are never sent.

use async_trait::async_trait;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::config::GenerationSettings;
use crate::domain::MergedContext;
use crate::providers::ai::{CompletionRequest, ContentPart, LlmError, LlmProvider, Message};

/// Preamble of the reference block added when context is non-empty.
pub const CONTEXT_PREAMBLE: &str = "Additional context that you may use as a reference. \
Use them if you feel they are relevant to the case. NOTE: They are not the patient's images. \
They are descriptions of other patients' images which can be used as a reference, if required.\n\n";

/// Errors from answer generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Image file not found: {0}")]
    ImageMissing(PathBuf),

    #[error("Image encoding failed for {path}: {source}")]
    ImageUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("API request failed: {0}")]
    Llm(#[from] LlmError),
}

/// Produces an answer text for a query with its retrieved context.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short description of the backing model, for diagnostics.
    fn describe(&self) -> String;

    async fn generate<'a>(
        &self,
        query: &str,
        image: Option<&'a Path>,
        context: &MergedContext,
    ) -> Result<String, GenerationError>;
}

/// Generator backed by a chat completion provider.
pub struct LlmGenerator {
    provider: Arc<dyn LlmProvider>,
    instructions: String,
    max_tokens: usize,
    temperature: f32,
}

impl LlmGenerator {
    /// Creates a generator with the default instructions and sampling.
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::from_settings(provider, &GenerationSettings::default())
    }

    pub fn from_settings(provider: Arc<dyn LlmProvider>, settings: &GenerationSettings) -> Self {
        Self {
            provider,
            instructions: settings.instructions.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }

    /// Assembles the completion request without sending it.
    pub fn build_request(
        &self,
        query: &str,
        image: Option<&Path>,
        context: &MergedContext,
    ) -> Result<CompletionRequest, GenerationError> {
        let mut message = Message::user(format!("{}\n\n{}", self.instructions, query));

        if let Some(path) = image {
            message = message.with_part(image_part(path)?);
        }
        if let Some(block) = context_block(context) {
            message = message.with_part(ContentPart::text(block));
        }

        Ok(CompletionRequest::new(vec![message])
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature))
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    fn describe(&self) -> String {
        format!("{}/{}", self.provider.name(), self.provider.model())
    }

    async fn generate<'a>(
        &self,
        query: &str,
        image: Option<&'a Path>,
        context: &MergedContext,
    ) -> Result<String, GenerationError> {
        let request = self.build_request(query, image, context)?;

        if image.is_some() && !self.provider.supports_vision() {
            tracing::warn!(
                model = self.provider.model(),
                "Model may not accept images, sending anyway"
            );
        }

        let started = Instant::now();
        let response = self.provider.complete(&request).await?;

        tracing::info!(
            provider = self.provider.name(),
            model = self.provider.model(),
            references = context.len(),
            image = image.is_some(),
            total_tokens = response.tokens_used.total_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated answer"
        );

        Ok(response.text)
    }
}

/// Reads an image and wraps it as an inline content part.
pub fn image_part(path: &Path) -> Result<ContentPart, GenerationError> {
    if !path.is_file() {
        return Err(GenerationError::ImageMissing(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|source| GenerationError::ImageUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(ContentPart::image(media_type(path), data))
}

/// MIME type by file extension; JPEG when unknown.
fn media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

/// The reference block for a non-empty context.
pub fn context_block(context: &MergedContext) -> Option<String> {
    if context.is_empty() {
        return None;
    }

    let mut block = String::from(CONTEXT_PREAMBLE);
    for (i, result) in context.iter().enumerate() {
        block.push_str(&format!(
            "Reference {}: {}\nSource: {}\n\n",
            i + 1,
            result.caption,
            result.source_name()
        ));
    }
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Modality, NaturalKey, QueryResult, RecordId};
    use crate::providers::ai::{CompletionResponse, FinishReason, LlmResult, TokenUsage};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every request and answers with a fixed reply.
    struct RecordingProvider {
        reply: LlmResult<String>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(LlmError::ApiError {
                    status,
                    message: "upstream unavailable".to_string(),
                }),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> CompletionRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    text: text.clone(),
                    tokens_used: TokenUsage::default(),
                    finish_reason: FinishReason::Stop,
                }),
                Err(LlmError::ApiError { status, message }) => Err(LlmError::ApiError {
                    status: *status,
                    message: message.clone(),
                }),
                Err(other) => Err(LlmError::Unavailable(other.to_string())),
            }
        }

        fn supports_vision(&self) -> bool {
            true
        }

        fn max_context_length(&self) -> usize {
            8_192
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    fn hit(key: &str, caption: &str, modality: Modality) -> QueryResult {
        QueryResult {
            id: RecordId::for_key(&NaturalKey::from(key)),
            caption: caption.to_string(),
            image_path: PathBuf::from(format!("/data/train_images/train/{key}.jpg")),
            score: 0.9,
            modality,
        }
    }

    #[test]
    fn context_block_lists_references_in_order() {
        let context = MergedContext::new(vec![
            hit("a", "Chest X-ray", Modality::Text),
            hit("b", "Head CT", Modality::Image),
        ]);

        let block = context_block(&context).unwrap();

        assert!(block.starts_with(CONTEXT_PREAMBLE));
        assert!(block.ends_with(
            "Reference 1: Chest X-ray\nSource: a.jpg\n\nReference 2: Head CT\nSource: b.jpg\n\n"
        ));
    }

    #[test]
    fn empty_context_adds_no_block() {
        assert_eq!(context_block(&MergedContext::default()), None);
    }

    #[test]
    fn media_type_from_extension() {
        assert_eq!(media_type(Path::new("scan.PNG")), "image/png");
        assert_eq!(media_type(Path::new("scan.jpeg")), "image/jpeg");
        assert_eq!(media_type(Path::new("scan")), "image/jpeg");
    }

    #[test]
    fn request_without_image_or_context() {
        let generator = LlmGenerator::new(Arc::new(RecordingProvider::replying("ok")));

        let request = generator
            .build_request("What is this?", None, &MergedContext::default())
            .unwrap();

        assert_eq!(request.messages.len(), 1);
        let message = &request.messages[0];
        assert_eq!(message.content.len(), 1);
        assert!(message.text().starts_with("You are a radiologist"));
        assert!(message.text().ends_with("\n\nWhat is this?"));
        assert_eq!(request.max_tokens, Some(600));
        assert_eq!(request.system_prompt, None);
    }

    #[test]
    fn request_with_image_and_context() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("query.png");
        std::fs::write(&image, b"hello").unwrap();

        let generator = LlmGenerator::new(Arc::new(RecordingProvider::replying("ok")));
        let context = MergedContext::new(vec![hit("a", "Chest X-ray", Modality::Text)]);

        let request = generator
            .build_request("Any fracture?", Some(&image), &context)
            .unwrap();

        let parts = &request.messages[0].content;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], ContentPart::image("image/png", "aGVsbG8="));
        assert!(matches!(&parts[2], ContentPart::Text { text } if text.contains("Reference 1: Chest X-ray")));
    }

    #[test]
    fn missing_image_is_an_error() {
        let generator = LlmGenerator::new(Arc::new(RecordingProvider::replying("ok")));

        let err = generator
            .build_request("q", Some(Path::new("/nonexistent.jpg")), &MergedContext::default())
            .unwrap_err();
        assert!(matches!(err, GenerationError::ImageMissing(_)));
    }

    #[tokio::test]
    async fn generate_returns_model_text_verbatim() {
        let provider = Arc::new(RecordingProvider::replying("  Likely pneumonia.\n"));
        let generator = LlmGenerator::new(provider.clone());

        let answer = generator
            .generate("What is this?", None, &MergedContext::default())
            .await
            .unwrap();

        assert_eq!(answer, "  Likely pneumonia.\n");
        assert_eq!(provider.last_request().temperature, 0.7);
        assert_eq!(generator.describe(), "recording/test-model");
    }

    #[tokio::test]
    async fn generate_surfaces_provider_errors() {
        let generator = LlmGenerator::new(Arc::new(RecordingProvider::failing(503)));

        let err = generator
            .generate("q", None, &MergedContext::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Llm(LlmError::ApiError { status: 503, .. })
        ));
        assert!(err.to_string().starts_with("API request failed"));
    }

    #[tokio::test]
    async fn settings_control_sampling() {
        let provider = Arc::new(RecordingProvider::replying("ok"));
        let settings = GenerationSettings {
            max_tokens: 128,
            temperature: 0.1,
            instructions: "Be brief.".to_string(),
            ..Default::default()
        };
        let generator = LlmGenerator::from_settings(provider.clone(), &settings);

        generator
            .generate("q", None, &MergedContext::default())
            .await
            .unwrap();

        let request = provider.last_request();
        assert_eq!(request.max_tokens, Some(128));
        assert_eq!(request.temperature, 0.1);
        assert_eq!(request.messages[0].text(), "Be brief.\n\nq");
    }
}
