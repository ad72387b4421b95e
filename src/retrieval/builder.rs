//! Index construction from a labeled dataset.
//!
//! The builder scans each split, samples its images, joins them with their
//! captions, then embeds and upserts the pairs in fixed-size batches. Bad
//! splits and bad batches are recorded in the [`BuildReport`] and skipped;
//! only store failures abort the build.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::dataset::{scan_split, DatasetLayout, ImageCaptionPair};
use crate::domain::{Record, RecordError, RecordPayload, SplitName};
use crate::embedding::{ensure_count, EmbeddingError, EmbeddingProvider};
use crate::index::{CollectionSchema, StoreError, VectorIndex};

/// Pairs embedded per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Errors that stop a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("sample rate {0} is outside (0, 1]")]
    InvalidSampleRate(f64),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a batch was left out of the index.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("invalid record: {0}")]
    Record(#[from] RecordError),
}

/// What happened to one split.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SplitOutcome {
    Loaded {
        split: SplitName,
        listed: usize,
        sampled: usize,
        matched: usize,
        unmatched: usize,
        missing_assets: usize,
    },
    Skipped {
        split: SplitName,
        reason: String,
    },
}

impl SplitOutcome {
    pub fn split(&self) -> &SplitName {
        match self {
            Self::Loaded { split, .. } | Self::Skipped { split, .. } => split,
        }
    }
}

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Upserted { batch: usize, records: usize },
    Skipped { batch: usize, pairs: usize, reason: String },
}

/// Summary of one index build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub collection: String,
    pub sample_rate: f64,
    pub batch_size: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub splits: Vec<SplitOutcome>,
    pub batches: Vec<BatchOutcome>,
    /// Records in the collection once the build finished.
    pub record_count: usize,
}

impl BuildReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Records written by this build (an upsert may overwrite earlier ones).
    pub fn records_upserted(&self) -> usize {
        self.batches
            .iter()
            .map(|b| match b {
                BatchOutcome::Upserted { records, .. } => *records,
                BatchOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn batches_skipped(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b, BatchOutcome::Skipped { .. }))
            .count()
    }

    pub fn splits_loaded(&self) -> usize {
        self.splits
            .iter()
            .filter(|s| matches!(s, SplitOutcome::Loaded { .. }))
            .count()
    }
}

/// A built collection, ready to be searched.
pub struct IndexHandle {
    name: String,
    index: Arc<dyn VectorIndex>,
    report: BuildReport,
}

impl IndexHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Current record count, read from the store.
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.index.count(&self.name).await
    }
}

/// Builds dual-vector collections from image/caption datasets.
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    seed: Option<u64>,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fixes the sampling draw. Without a seed every build samples afresh.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Builds `collection` from a ROCOv2-style dataset under `dataset_root`.
    pub async fn build(
        &self,
        collection: &str,
        dataset_root: &Path,
        sample_rate: f64,
    ) -> Result<IndexHandle, BuildError> {
        self.build_layout(collection, &DatasetLayout::rocov2(dataset_root), sample_rate)
            .await
    }

    /// Builds `collection` from the splits of an explicit layout.
    pub async fn build_layout(
        &self,
        collection: &str,
        layout: &DatasetLayout,
        sample_rate: f64,
    ) -> Result<IndexHandle, BuildError> {
        if !(sample_rate > 0.0 && sample_rate <= 1.0) {
            return Err(BuildError::InvalidSampleRate(sample_rate));
        }
        if self.batch_size == 0 {
            return Err(BuildError::InvalidBatchSize);
        }

        let started_at = Utc::now();
        tracing::info!(
            collection,
            root = %layout.root().display(),
            sample_rate,
            batch_size = self.batch_size,
            embedder = self.embedder.name(),
            store = self.index.backend(),
            "Building index"
        );

        self.ensure_collection(collection).await?;

        let (splits, pairs) = self.scan(layout, sample_rate);

        let mut batches = Vec::new();
        for (batch, chunk) in pairs.chunks(self.batch_size).enumerate() {
            match self.embed_batch(chunk) {
                Ok(records) => {
                    let count = records.len();
                    self.index.upsert(collection, records).await?;
                    tracing::debug!(batch, records = count, "Upserted batch");
                    batches.push(BatchOutcome::Upserted {
                        batch,
                        records: count,
                    });
                }
                Err(e) => {
                    tracing::warn!(batch, pairs = chunk.len(), error = %e, "Skipping batch");
                    batches.push(BatchOutcome::Skipped {
                        batch,
                        pairs: chunk.len(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let record_count = self.index.count(collection).await?;
        let report = BuildReport {
            collection: collection.to_string(),
            sample_rate,
            batch_size: self.batch_size,
            started_at,
            finished_at: Utc::now(),
            splits,
            batches,
            record_count,
        };

        tracing::info!(
            collection,
            splits_loaded = report.splits_loaded(),
            upserted = report.records_upserted(),
            batches_skipped = report.batches_skipped(),
            record_count,
            duration_ms = report.duration().num_milliseconds(),
            "Index build complete"
        );

        Ok(IndexHandle {
            name: collection.to_string(),
            index: self.index.clone(),
            report,
        })
    }

    async fn ensure_collection(&self, name: &str) -> Result<(), StoreError> {
        if self.index.collection_exists(name).await? {
            tracing::debug!(collection = name, "Using existing collection");
            return Ok(());
        }

        let schema = CollectionSchema::cosine(
            self.embedder.text_dimension(),
            self.embedder.image_dimension(),
        );
        match self.index.create_collection(name, &schema).await {
            Ok(()) => {
                tracing::info!(
                    collection = name,
                    text_dim = schema.text.size,
                    image_dim = schema.image.size,
                    "Created collection"
                );
                Ok(())
            }
            // Created concurrently by someone else
            Err(StoreError::CollectionExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Scans every split in order and concatenates their pairs.
    fn scan(
        &self,
        layout: &DatasetLayout,
        sample_rate: f64,
    ) -> (Vec<SplitOutcome>, Vec<ImageCaptionPair>) {
        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(rand::thread_rng()),
        };

        let mut outcomes = Vec::with_capacity(layout.splits().len());
        let mut pairs = Vec::new();

        for split in layout.splits() {
            match scan_split(split, sample_rate, &mut *rng) {
                Ok(scan) => {
                    outcomes.push(SplitOutcome::Loaded {
                        split: split.name.clone(),
                        listed: scan.listed,
                        sampled: scan.sampled,
                        matched: scan.pairs.len(),
                        unmatched: scan.unmatched,
                        missing_assets: scan.missing_assets,
                    });
                    pairs.extend(scan.pairs);
                }
                Err(e) => {
                    tracing::warn!(split = %split.name, error = %e, "Skipping split");
                    outcomes.push(SplitOutcome::Skipped {
                        split: split.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        (outcomes, pairs)
    }

    fn embed_batch(&self, batch: &[ImageCaptionPair]) -> Result<Vec<Record>, BatchError> {
        let captions: Vec<String> = batch.iter().map(|p| p.caption.clone()).collect();
        let paths: Vec<PathBuf> = batch.iter().map(|p| p.image_path.clone()).collect();

        let text_vectors = self.embedder.embed_texts(&captions)?;
        ensure_count(batch.len(), &text_vectors)?;
        let image_vectors = self.embedder.embed_images(&paths)?;
        ensure_count(batch.len(), &image_vectors)?;

        batch
            .iter()
            .zip(text_vectors)
            .zip(image_vectors)
            .map(|((pair, text), image)| {
                let payload = RecordPayload {
                    image_id: pair.key.clone(),
                    caption: pair.caption.clone(),
                    image_path: pair.image_path.clone(),
                    split: pair.split.clone(),
                };
                Ok(Record::new(payload, text, image)?)
            })
            .collect()
    }
}
