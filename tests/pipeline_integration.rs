//! End-to-end tests for the retrieval pipeline.
//!
//! These run the real builder, retriever and orchestrator over a small
//! on-disk dataset, using the offline embedding provider, the in-memory
//! index and a stub chat provider that records what it was sent.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use medrag::config::Settings;
use medrag::domain::{Modality, NaturalKey, RecordId};
use medrag::embedding::LocalEmbeddingProvider;
use medrag::index::InMemoryIndex;
use medrag::providers::ai::{
    CompletionRequest, CompletionResponse, ContentPart, FinishReason, LlmProvider, LlmResult,
    TokenUsage,
};
use medrag::retrieval::{IndexBuilder, Retriever};
use medrag::services::{LlmGenerator, ModalityOutcome, MultimodalAssistant, CONTEXT_PREAMBLE};

// ============================================================================
// Fixtures
// ============================================================================

/// Writes a scan whose bright region is the given quadrant.
fn write_image(path: &Path, quadrant: u32) {
    let img = RgbImage::from_fn(32, 32, |x, y| {
        let q = (x / 16) + 2 * (y / 16);
        if q == quadrant % 4 {
            Rgb([240, 240, 240])
        } else {
            Rgb([20, 20, 20])
        }
    });
    img.save(path).unwrap();
}

/// Writes `<root>/<split>_captions.csv` and `<root>/<split>_images/<split>/*.jpg`.
fn write_split(root: &Path, split: &str, rows: &[(&str, &str)]) -> Vec<PathBuf> {
    let images_dir = root.join(format!("{split}_images")).join(split);
    std::fs::create_dir_all(&images_dir).unwrap();

    let mut csv = String::from("ID,Caption\n");
    let mut paths = Vec::new();
    for (i, (id, caption)) in rows.iter().enumerate() {
        csv.push_str(&format!("{id},\"{caption}\"\n"));
        let path = images_dir.join(format!("{id}.jpg"));
        write_image(&path, i as u32);
        paths.push(path);
    }
    std::fs::write(root.join(format!("{split}_captions.csv")), csv).unwrap();
    paths
}

fn embedder() -> Arc<LocalEmbeddingProvider> {
    Arc::new(LocalEmbeddingProvider::new(512, 8))
}

/// Chat provider that answers with a fixed string and keeps every request.
#[derive(Default)]
struct RecordingProvider {
    requests: Mutex<Vec<CompletionRequest>>,
}

impl RecordingProvider {
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
        Ok(CompletionResponse {
            text: "Findings consistent with the references.".to_string(),
            tokens_used: TokenUsage::default(),
            finish_reason: FinishReason::Stop,
        })
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn max_context_length(&self) -> usize {
        8192
    }

    fn model(&self) -> &str {
        "stub-vision"
    }
}

fn settings_for(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.dataset.root = root.to_path_buf();
    settings.dataset.sample_rate = 1.0;
    settings.dataset.seed = Some(42);
    settings.retrieval.top_k = 3;
    settings
}

// ============================================================================
// Builder + Retriever
// ============================================================================

#[tokio::test]
async fn build_then_search_text() {
    let dir = TempDir::new().unwrap();
    write_split(
        dir.path(),
        "train",
        &[
            ("a", "chest x-ray showing right lower lobe consolidation"),
            ("b", "axial brain mri with diffusion restriction"),
        ],
    );

    let index = Arc::new(InMemoryIndex::new());
    let handle = IndexBuilder::new(embedder(), index.clone())
        .build("scans", dir.path(), 1.0)
        .await
        .unwrap();

    assert_eq!(handle.count().await.unwrap(), 2);
    let mut expected = vec![
        RecordId::for_key(&NaturalKey::from("a")),
        RecordId::for_key(&NaturalKey::from("b")),
    ];
    expected.sort();
    assert_eq!(index.record_ids("scans").await.unwrap(), expected);

    let retriever = Retriever::new(embedder(), index.clone());
    let hits = retriever
        .search_text("scans", "chest x-ray consolidation", 2)
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, RecordId::for_key(&NaturalKey::from("a")));
    assert!(hits[0].score >= hits[1].score);
    assert!(hits.iter().all(|h| h.modality == Modality::Text));
}

#[tokio::test]
async fn search_image_finds_the_same_scan_first() {
    let dir = TempDir::new().unwrap();
    let paths = write_split(
        dir.path(),
        "valid",
        &[("a", "chest x-ray"), ("b", "knee ct"), ("c", "abdominal ultrasound")],
    );

    let index = Arc::new(InMemoryIndex::new());
    IndexBuilder::new(embedder(), index.clone())
        .build("scans", dir.path(), 1.0)
        .await
        .unwrap();

    let retriever = Retriever::new(embedder(), index);
    let hits = retriever.search_image("scans", &paths[1], 3).await.unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].image_path, paths[1]);
    assert_eq!(hits[0].caption, "knee ct");
    assert!(hits[0].score > 0.99);
    assert!(hits.iter().all(|h| h.modality == Modality::Image));
}

#[tokio::test]
async fn empty_root_builds_an_empty_searchable_collection() {
    let dir = TempDir::new().unwrap();

    let index = Arc::new(InMemoryIndex::new());
    let handle = IndexBuilder::new(embedder(), index.clone())
        .build("scans", dir.path(), 0.5)
        .await
        .unwrap();

    assert_eq!(handle.count().await.unwrap(), 0);
    assert_eq!(handle.report().splits_loaded(), 0);

    let retriever = Retriever::new(embedder(), index);
    let hits = retriever.search_text("scans", "anything", 3).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn rebuild_does_not_duplicate_records() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", &[("a", "chest x-ray"), ("b", "brain mri")]);
    write_split(dir.path(), "test", &[("c", "spine ct")]);

    let index = Arc::new(InMemoryIndex::new());
    for _ in 0..2 {
        let handle = IndexBuilder::new(embedder(), index.clone())
            .build("scans", dir.path(), 1.0)
            .await
            .unwrap();
        assert_eq!(handle.count().await.unwrap(), 3);
    }
}

#[tokio::test]
async fn missing_image_query_yields_no_results() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", &[("a", "chest x-ray")]);

    let index = Arc::new(InMemoryIndex::new());
    IndexBuilder::new(embedder(), index.clone())
        .build("scans", dir.path(), 1.0)
        .await
        .unwrap();

    let retriever = Retriever::new(embedder(), index);
    let hits = retriever
        .search_image("scans", &dir.path().join("nope.jpg"), 3)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

// ============================================================================
// Orchestrator
// ============================================================================

#[tokio::test]
async fn answer_sends_query_image_and_references() {
    let dir = TempDir::new().unwrap();
    let paths = write_split(
        dir.path(),
        "train",
        &[("a", "chest x-ray with pleural effusion"), ("b", "brain mri")],
    );

    let provider = Arc::new(RecordingProvider::default());
    let generator = Arc::new(LlmGenerator::new(provider.clone()));
    let assistant = MultimodalAssistant::startup(
        &settings_for(dir.path()),
        embedder(),
        Arc::new(InMemoryIndex::new()),
        generator,
    )
    .await
    .unwrap();

    let answer = assistant
        .answer("Is there an effusion?", Some(&paths[0]))
        .await
        .unwrap();

    assert_eq!(answer.text, "Findings consistent with the references.");
    // Two text hits and two image hits, concatenated.
    assert_eq!(answer.retrieval.context.len(), 4);
    assert_eq!(answer.retrieval.text, ModalityOutcome::Searched { hits: 2 });
    assert_eq!(answer.retrieval.image, ModalityOutcome::Searched { hits: 2 });

    let request = provider.last_request();
    assert_eq!(request.messages.len(), 1);
    let parts = &request.messages[0].content;
    assert_eq!(parts.len(), 3);

    match &parts[0] {
        ContentPart::Text { text } => assert!(text.ends_with("\n\nIs there an effusion?")),
        other => panic!("expected text part, got {other:?}"),
    }
    assert!(matches!(&parts[1], ContentPart::Image { media_type, .. } if media_type == "image/jpeg"));
    match &parts[2] {
        ContentPart::Text { text } => {
            assert!(text.starts_with(CONTEXT_PREAMBLE));
            assert!(text.contains("Reference 1: "));
            assert!(text.contains("Reference 4: "));
            assert!(text.contains("Source: a.jpg"));
        }
        other => panic!("expected text part, got {other:?}"),
    }
}

#[tokio::test]
async fn answer_without_image_skips_image_search() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", &[("a", "chest x-ray")]);

    let provider = Arc::new(RecordingProvider::default());
    let assistant = MultimodalAssistant::startup(
        &settings_for(dir.path()),
        embedder(),
        Arc::new(InMemoryIndex::new()),
        Arc::new(LlmGenerator::new(provider.clone())),
    )
    .await
    .unwrap();

    let answer = assistant.answer("Describe the findings", None).await.unwrap();

    assert_eq!(answer.retrieval.image, ModalityOutcome::NotRequested);
    assert_eq!(answer.retrieval.context.len(), 1);
    let request = provider.last_request();
    assert!(!request.has_images());
    assert_eq!(request.messages[0].content.len(), 2);
}

#[tokio::test]
async fn ping_sends_no_context() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", &[("a", "chest x-ray")]);

    let provider = Arc::new(RecordingProvider::default());
    let assistant = MultimodalAssistant::startup(
        &settings_for(dir.path()),
        embedder(),
        Arc::new(InMemoryIndex::new()),
        Arc::new(LlmGenerator::new(provider.clone())),
    )
    .await
    .unwrap();

    assistant.ping().await.unwrap();

    let request = provider.last_request();
    assert_eq!(request.messages[0].content.len(), 1);
}

#[tokio::test]
async fn status_reports_collection_and_build() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", &[("a", "chest x-ray"), ("b", "brain mri")]);

    let assistant = MultimodalAssistant::startup(
        &settings_for(dir.path()),
        embedder(),
        Arc::new(InMemoryIndex::new()),
        Arc::new(LlmGenerator::new(Arc::new(RecordingProvider::default()))),
    )
    .await
    .unwrap();

    let status = assistant.status().await.unwrap();
    assert_eq!(status.collection, "medical_images_text");
    assert_eq!(status.record_count, 2);
    assert_eq!(status.embedder, "local");
    assert_eq!(status.generator, "recording/stub-vision");
    assert_eq!(status.top_k, 3);
    assert_eq!(status.last_build.splits_loaded(), 1);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["record_count"], 2);
}
