//! In-memory vector index.
//!
//! Stores records per collection and answers searches by scoring every
//! record with cosine similarity. Contents live for the process lifetime.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{Modality, QueryResult, Record, RecordId};
use crate::embedding::Embedding;
use crate::index::{CollectionSchema, StoreError, StoreResult, VectorIndex};

#[derive(Debug)]
struct Collection {
    schema: CollectionSchema,
    records: HashMap<RecordId, Record>,
}

/// Process-local vector index with exhaustive similarity search.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the schema of a collection, if it exists.
    pub async fn schema(&self, name: &str) -> Option<CollectionSchema> {
        self.collections.read().await.get(name).map(|c| c.schema)
    }

    /// Returns the ids stored in a collection, sorted.
    pub async fn record_ids(&self, name: &str) -> StoreResult<Vec<RecordId>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        let mut ids: Vec<RecordId> = collection.records.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    /// Retrieves a stored record by id.
    pub async fn get(&self, name: &str, id: RecordId) -> Option<Record> {
        self.collections
            .read()
            .await
            .get(name)
            .and_then(|c| c.records.get(&id).cloned())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }

        collections.insert(
            name.to_string(),
            Collection {
                schema: *schema,
                records: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, records: Vec<Record>) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        // Validate the whole batch before writing any of it
        for record in &records {
            collection
                .schema
                .check_dimension(Modality::Text, record.text_vector())?;
            collection
                .schema
                .check_dimension(Modality::Image, record.image_vector())?;
        }

        for record in records {
            collection.records.insert(record.id(), record);
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        field: Modality,
        query: &Embedding,
        limit: usize,
    ) -> StoreResult<Vec<QueryResult>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        collection.schema.check_dimension(field, query)?;

        let mut scores: Vec<(&Record, f32)> = collection
            .records
            .values()
            .map(|record| (record, query.cosine_similarity(record.vector(field))))
            .collect();

        // Sort by similarity descending, ties by id for a stable order
        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.id().cmp(&b.0.id()))
        });
        scores.truncate(limit);

        Ok(scores
            .into_iter()
            .map(|(record, score)| QueryResult {
                id: record.id(),
                caption: record.payload().caption.clone(),
                image_path: record.payload().image_path.clone(),
                score,
                modality: field,
            })
            .collect())
    }

    async fn count(&self, name: &str) -> StoreResult<usize> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.records.len())
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }
}
