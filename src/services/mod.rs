//! Services layer.
//!
//! Services orchestrate the retrieval core and the model providers:
//!
//! ```text
//! CLI (main.rs)
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Retrieval core (builder, retriever, merge) + Providers
//! ```
//!
//! - [`MultimodalAssistant`]: Builds the index at startup and answers queries
//! - [`LlmGenerator`]: Assembles the multimodal prompt and calls the model

mod assistant_service;
mod generation;

pub use assistant_service::{
    ping, Answer, AssistantStatus, ModalityOutcome, MultimodalAssistant, Retrieval, PING_PROMPT,
};
pub use generation::{
    context_block, image_part, GenerationError, Generator, LlmGenerator, CONTEXT_PREAMBLE,
};

#[cfg(test)]
pub use generation::MockGenerator;
