//! External service providers.
//!
//! - [`ai`] - Chat completion providers (OpenAI, Groq, Ollama)

pub mod ai;
