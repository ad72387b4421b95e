//! Query orchestration: retrieve, merge, generate.
//!
//! The assistant builds its index once at startup. Each query then searches
//! by text (always) and by image (when one is given), merges both result
//! lists and hands the context to the generator. Retrieval problems only
//! shrink the context; generation problems are returned to the caller.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::domain::{MergedContext, QueryResult};
use crate::embedding::EmbeddingProvider;
use crate::index::{StoreResult, VectorIndex};
use crate::retrieval::{merge, BuildError, BuildReport, IndexBuilder, IndexHandle, Retriever};
use crate::services::{GenerationError, Generator};

/// Prompt sent by [`MultimodalAssistant::ping`].
pub const PING_PROMPT: &str = "Test message to verify API connection.";

/// How one modality's search went for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModalityOutcome {
    Searched { hits: usize },
    NotRequested,
    Failed { reason: String },
}

/// Context gathered for a query, with per-modality outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub context: MergedContext,
    pub text: ModalityOutcome,
    pub image: ModalityOutcome,
}

/// A generated answer and the context it was given.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub retrieval: Retrieval,
}

/// Diagnostics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantStatus {
    pub collection: String,
    pub backend: String,
    pub embedder: String,
    pub generator: String,
    pub top_k: usize,
    pub record_count: usize,
    pub last_build: BuildReport,
}

/// Multimodal question answering over a built index.
pub struct MultimodalAssistant {
    handle: IndexHandle,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    embedder_name: &'static str,
    top_k: usize,
}

impl MultimodalAssistant {
    /// Builds the index described by `settings`, then wires the assistant.
    pub async fn startup(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, BuildError> {
        let handle = IndexBuilder::new(embedder.clone(), index)
            .with_batch_size(settings.dataset.batch_size)
            .with_seed(settings.dataset.seed)
            .build_layout(
                &settings.index.collection_name,
                &settings.dataset.layout(),
                settings.dataset.sample_rate,
            )
            .await?;

        Ok(Self::with_index(
            handle,
            embedder,
            generator,
            settings.retrieval.top_k,
        ))
    }

    /// Wires the assistant to an index that is already built.
    pub fn with_index(
        handle: IndexHandle,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        top_k: usize,
    ) -> Self {
        let retriever = Retriever::new(embedder.clone(), handle.index().clone());
        Self {
            handle,
            retriever,
            generator,
            embedder_name: embedder.name(),
            top_k,
        }
    }

    pub fn last_build(&self) -> &BuildReport {
        self.handle.report()
    }

    /// Searches both modalities and merges the results.
    pub async fn retrieve(&self, query: &str, image: Option<&Path>) -> Retrieval {
        let collection = self.handle.name();

        let (text_results, text) = absorb(
            "text",
            self.retriever
                .search_text(collection, query, self.top_k)
                .await,
        );

        let (image_results, image) = match image {
            Some(path) => absorb(
                "image",
                self.retriever
                    .search_image(collection, path, self.top_k)
                    .await,
            ),
            None => (Vec::new(), ModalityOutcome::NotRequested),
        };

        Retrieval {
            context: merge(text_results, image_results),
            text,
            image,
        }
    }

    /// Answers a question, optionally about an image.
    pub async fn answer(
        &self,
        query: &str,
        image: Option<&Path>,
    ) -> Result<Answer, GenerationError> {
        let retrieval = self.retrieve(query, image).await;
        tracing::debug!(
            references = retrieval.context.len(),
            text = ?retrieval.text,
            image = ?retrieval.image,
            "Retrieved context"
        );

        let text = self
            .generator
            .generate(query, image, &retrieval.context)
            .await?;

        Ok(Answer { text, retrieval })
    }

    /// Collection and model diagnostics.
    pub async fn status(&self) -> StoreResult<AssistantStatus> {
        Ok(AssistantStatus {
            collection: self.handle.name().to_string(),
            backend: self.handle.index().backend().to_string(),
            embedder: self.embedder_name.to_string(),
            generator: self.generator.describe(),
            top_k: self.top_k,
            record_count: self.handle.count().await?,
            last_build: self.handle.report().clone(),
        })
    }

    /// Sends a fixed prompt with no context to check the model is reachable.
    pub async fn ping(&self) -> Result<String, GenerationError> {
        ping(self.generator.as_ref()).await
    }
}

/// Checks `generator` is reachable without building an index.
pub async fn ping(generator: &dyn Generator) -> Result<String, GenerationError> {
    generator
        .generate(PING_PROMPT, None, &MergedContext::default())
        .await
}

fn absorb(
    modality: &'static str,
    result: StoreResult<Vec<QueryResult>>,
) -> (Vec<QueryResult>, ModalityOutcome) {
    match result {
        Ok(results) => {
            let hits = results.len();
            (results, ModalityOutcome::Searched { hits })
        }
        Err(e) => {
            tracing::warn!(modality, error = %e, "Search failed, continuing without it");
            (
                Vec::new(),
                ModalityOutcome::Failed {
                    reason: e.to_string(),
                },
            )
        }
    }
}
