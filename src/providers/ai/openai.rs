//! Chat completions over the OpenAI wire format.
//!
//! OpenAI, Groq, vLLM, LM Studio and Ollama all accept this format. A message
//! with images is sent as a part list, each image inlined as a `data:` URL;
//! text-only messages are sent as a plain string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{
    CompletionRequest, CompletionResponse, ContentPart, FinishReason, LlmError, LlmProvider,
    LlmResult, Message, Role, TokenUsage,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Base URL of Groq's OpenAI-compatible API.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const FALLBACK_CONTEXT_LENGTH: usize = 4_096;

/// Context windows by model-name fragment, most specific first.
const CONTEXT_LENGTHS: &[(&str, usize)] = &[
    ("gpt-4.1", 1_047_576),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5", 4_096),
    ("llama-4", 131_072),
    ("llama-3.2-90b-vision", 128_000),
    ("llama-3.2-11b-vision", 128_000),
];

/// Name fragments of models that accept image input.
const VISION_MARKERS: &[&str] = &[
    "gpt-4o", "gpt-4-turbo", "gpt-4.1", "llama-4", "vision", "llava", "pixtral", "-vl",
];

fn model_context_length(model: &str) -> usize {
    let model = model.to_lowercase();
    CONTEXT_LENGTHS
        .iter()
        .find(|(fragment, _)| model.contains(fragment))
        .map_or(FALLBACK_CONTEXT_LENGTH, |(_, length)| *length)
}

fn model_supports_vision(model: &str) -> bool {
    let model = model.to_lowercase();
    VISION_MARKERS.iter().any(|marker| model.contains(marker))
}

mod wire {
    use super::*;

    #[derive(Debug, Serialize)]
    pub(super) struct ChatBody<'a> {
        pub model: &'a str,
        pub messages: Vec<ChatMessage<'a>>,
        pub temperature: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub max_tokens: Option<usize>,
    }

    #[derive(Debug, Serialize)]
    pub(super) struct ChatMessage<'a> {
        pub role: Role,
        pub content: ChatContent<'a>,
    }

    #[derive(Debug, Serialize)]
    #[serde(untagged)]
    pub(super) enum ChatContent<'a> {
        Plain(String),
        Parts(Vec<ChatPart<'a>>),
    }

    #[derive(Debug, Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum ChatPart<'a> {
        Text { text: &'a str },
        ImageUrl { image_url: ImageUrl },
    }

    #[derive(Debug, Serialize)]
    pub(super) struct ImageUrl {
        pub url: String,
    }

    impl<'a> From<&'a Message> for ChatMessage<'a> {
        fn from(message: &'a Message) -> Self {
            let content = if message.has_images() {
                ChatContent::Parts(
                    message
                        .content
                        .iter()
                        .map(|part| match part {
                            ContentPart::Text { text } => ChatPart::Text { text },
                            ContentPart::Image { .. } => ChatPart::ImageUrl {
                                image_url: ImageUrl {
                                    url: part.data_url().unwrap_or_default(),
                                },
                            },
                        })
                        .collect(),
                )
            } else {
                ChatContent::Plain(message.text())
            };

            Self {
                role: message.role,
                content,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ChatReply {
        #[serde(default)]
        pub choices: Vec<Choice>,
        pub usage: Option<TokenUsage>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Choice {
        pub message: ReplyMessage,
        pub finish_reason: Option<FinishReason>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ReplyMessage {
        pub content: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ErrorBody {
        pub error: ErrorDetail,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ErrorDetail {
        pub message: String,
        #[serde(default)]
        pub code: Option<String>,
    }
}

use wire::{ChatBody, ChatContent, ChatMessage, ChatReply, ErrorBody};

/// Client for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    name: &'static str,
    base_url: String,
    api_key: Option<String>,
    model: String,
    context_length: usize,
    vision: bool,
}

impl OpenAiCompatibleProvider {
    fn preset(name: &'static str, base_url: &str, api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            context_length: model_context_length(&model),
            vision: model_supports_vision(&model),
            model,
        }
    }

    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::preset("openai", OPENAI_BASE_URL, Some(api_key.into()), model.into())
    }

    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::preset("groq", GROQ_BASE_URL, Some(api_key.into()), model.into())
    }

    /// A self-hosted or third-party endpoint; the key is optional.
    pub fn custom(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::preset("openai-compatible", &base_url.into(), api_key, model.into())
    }

    /// Points a preset at a different endpoint (proxies, regional hosts).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_context_length(mut self, length: usize) -> Self {
        self.context_length = length;
        self
    }

    /// Overrides the vision guess made from the model name.
    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    /// Replaces the HTTP client, e.g. to set a timeout.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn chat_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatBody<'a> {
        let system = request.system_prompt.as_ref().map(|prompt| ChatMessage {
            role: Role::System,
            content: ChatContent::Plain(prompt.clone()),
        });

        ChatBody {
            model: &self.model,
            messages: system
                .into_iter()
                .chain(request.messages.iter().map(ChatMessage::from))
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Maps a non-success response to the matching error.
async fn error_from_response(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        return LlmError::RateLimited { retry_after_secs };
    }

    match response.json::<ErrorBody>().await {
        Ok(ErrorBody { error }) if status == 401 || error.code.as_deref() == Some("invalid_api_key") => {
            LlmError::AuthenticationError(error.message)
        }
        Ok(ErrorBody { error }) => LlmError::ApiError {
            status,
            message: error.message,
        },
        Err(_) => LlmError::ApiError {
            status,
            message: format!("HTTP {status}"),
        },
    }
}

fn response_from_reply(reply: ChatReply) -> LlmResult<CompletionResponse> {
    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices returned".to_string()))?;

    Ok(CompletionResponse {
        text: choice.message.content.unwrap_or_default(),
        tokens_used: reply.usage.unwrap_or_default(),
        finish_reason: choice.finish_reason.unwrap_or(FinishReason::Other),
    })
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        tracing::debug!(
            provider = self.name,
            model = %self.model,
            images = request.has_images(),
            "Sending chat completion"
        );

        let mut call = self.client.post(self.endpoint()).json(&self.chat_body(request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        response_from_reply(reply)
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    fn max_context_length(&self) -> usize {
        self.context_length
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCOUT: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

    #[test]
    fn context_length_by_model_family() {
        assert_eq!(model_context_length(SCOUT), 131_072);
        assert_eq!(model_context_length("gpt-4o-mini"), 128_000);
        assert_eq!(model_context_length("gpt-4-0613"), 8_192);
        assert_eq!(model_context_length("llama-3.2-11b-vision-preview"), 128_000);
        assert_eq!(model_context_length("mistral-7b"), FALLBACK_CONTEXT_LENGTH);
    }

    #[test]
    fn vision_by_model_family() {
        assert!(model_supports_vision(SCOUT));
        assert!(model_supports_vision("gpt-4o"));
        assert!(model_supports_vision("Qwen2.5-VL-7B"));
        assert!(model_supports_vision("llava:13b"));
        assert!(!model_supports_vision("gpt-3.5-turbo"));
        assert!(!model_supports_vision("mistral"));
    }

    #[test]
    fn text_only_messages_are_plain_strings() {
        let request = CompletionRequest::new(vec![Message::user("Is the heart enlarged?")])
            .with_system_prompt("You are a radiologist")
            .with_max_tokens(600);

        let provider = OpenAiCompatibleProvider::groq("key", SCOUT);
        let json = serde_json::to_value(provider.chat_body(&request)).unwrap();

        assert_eq!(json["model"], SCOUT);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "You are a radiologist");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "Is the heart enlarged?");
        assert_eq!(json["max_tokens"], 600);
    }

    #[test]
    fn image_messages_are_part_lists() {
        let message = Message::user("What is shown?")
            .with_part(ContentPart::image("image/jpeg", "aGVsbG8="))
            .with_part(ContentPart::text("Reference 1: chest x-ray"));
        let request = CompletionRequest::new(vec![message]);

        let provider = OpenAiCompatibleProvider::groq("key", SCOUT);
        let json = serde_json::to_value(provider.chat_body(&request)).unwrap();

        let parts = &json["messages"][0]["content"];
        assert_eq!(parts[0], serde_json::json!({"type": "text", "text": "What is shown?"}));
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,aGVsbG8=");
        assert_eq!(parts[2]["text"], "Reference 1: chest x-ray");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn reply_becomes_response() {
        let reply: ChatReply = serde_json::from_str(
            r#"{
                "choices": [{"message": {"content": "No acute findings."}, "finish_reason": "length"}],
                "usage": {"prompt_tokens": 812, "completion_tokens": 600, "total_tokens": 1412}
            }"#,
        )
        .unwrap();

        let response = response_from_reply(reply).unwrap();
        assert_eq!(response.text, "No acute findings.");
        assert_eq!(response.finish_reason, FinishReason::Length);
        assert_eq!(response.tokens_used.total_tokens, 1412);
    }

    #[test]
    fn reply_without_choices_is_invalid() {
        let reply: ChatReply = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            response_from_reply(reply),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn missing_finish_reason_and_usage() {
        let reply: ChatReply =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();

        let response = response_from_reply(reply).unwrap();
        assert_eq!(response.text, "");
        assert_eq!(response.finish_reason, FinishReason::Other);
        assert_eq!(response.tokens_used.total_tokens, 0);
    }

    #[test]
    fn presets() {
        let groq = OpenAiCompatibleProvider::groq("gsk-test", SCOUT);
        assert_eq!(groq.name(), "groq");
        assert_eq!(groq.endpoint(), format!("{GROQ_BASE_URL}/chat/completions"));
        assert!(groq.supports_vision());

        let openai = OpenAiCompatibleProvider::openai("sk-test", "gpt-4o")
            .with_base_url("https://proxy.internal/v1/");
        assert_eq!(openai.name(), "openai");
        assert_eq!(openai.endpoint(), "https://proxy.internal/v1/chat/completions");
    }

    #[test]
    fn custom_endpoint() {
        let provider =
            OpenAiCompatibleProvider::custom("http://localhost:8000/v1/", None, "local-model")
                .with_context_length(8192)
                .with_vision(true);

        assert_eq!(provider.name(), "openai-compatible");
        assert_eq!(provider.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert!(provider.api_key.is_none());
        assert_eq!(provider.max_context_length(), 8192);
        assert!(provider.supports_vision());
    }
}
