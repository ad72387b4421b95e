//! Qdrant vector index over its REST API.
//!
//! Each record becomes a point with two named vectors (`text`, `image`) and
//! the record payload. Points are written with `wait=true` so an upsert is
//! visible to searches once the call returns.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::{Modality, QueryResult, Record, RecordId};
use crate::embedding::Embedding;
use crate::index::{CollectionSchema, Distance, StoreError, StoreResult, VectorIndex, VectorParams};

/// Default base URL of a local Qdrant instance.
pub const QDRANT_DEFAULT_URL: &str = "http://localhost:6333";

/// Payload fields returned with search hits.
const RESULT_PAYLOAD_FIELDS: [&str; 2] = ["caption", "image_path"];

#[derive(Debug, Serialize)]
struct CreateCollectionRequest {
    vectors: NamedVectorsConfig,
}

#[derive(Debug, Serialize)]
struct NamedVectorsConfig {
    text: QdrantVectorParams,
    image: QdrantVectorParams,
}

#[derive(Debug, Serialize)]
struct QdrantVectorParams {
    size: usize,
    distance: &'static str,
}

impl From<VectorParams> for QdrantVectorParams {
    fn from(params: VectorParams) -> Self {
        Self {
            size: params.size,
            distance: match params.distance {
                Distance::Cosine => "Cosine",
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: Vec<QdrantPoint<'a>>,
}

#[derive(Debug, Serialize)]
struct QdrantPoint<'a> {
    id: Uuid,
    vector: PointVectors<'a>,
    payload: &'a crate::domain::RecordPayload,
}

#[derive(Debug, Serialize)]
struct PointVectors<'a> {
    text: &'a [f32],
    image: &'a [f32],
}

impl<'a> From<&'a Record> for QdrantPoint<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            id: record.id().0,
            vector: PointVectors {
                text: &record.text_vector().values,
                image: &record.image_vector().values,
            },
            payload: record.payload(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: NamedVector<'a>,
    limit: usize,
    with_payload: [&'static str; 2],
}

#[derive(Debug, Serialize)]
struct NamedVector<'a> {
    name: &'static str,
    vector: &'a [f32],
}

#[derive(Debug, Serialize)]
struct CountRequest {
    exact: bool,
}

/// Envelope shared by all Qdrant responses.
#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f32,
    payload: Option<HitPayload>,
}

#[derive(Debug, Deserialize)]
struct HitPayload {
    caption: String,
    image_path: PathBuf,
}

/// Qdrant API error response.
#[derive(Debug, Deserialize)]
struct QdrantError {
    status: QdrantErrorStatus,
}

#[derive(Debug, Deserialize)]
struct QdrantErrorStatus {
    error: String,
}

/// Vector index backed by a Qdrant server.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    /// Creates an index client for the given server URL.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Creates an index client for a Qdrant instance on localhost.
    pub fn local() -> Self {
        Self::new(QDRANT_DEFAULT_URL, None)
    }

    /// Overrides the HTTP client (useful for custom timeouts or proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(api_key) {
                headers.insert("api-key", value);
            }
        }

        headers
    }

    fn collection_url(&self, name: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, name, suffix)
    }

    async fn handle_error_response(&self, name: &str, response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let message = match response.json::<QdrantError>().await {
            Ok(error) => error.status.error,
            Err(_) => format!("HTTP {}", status),
        };
        error_for_status(name, status, message)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
        response: reqwest::Response,
    ) -> StoreResult<T> {
        if !response.status().is_success() {
            return Err(self.handle_error_response(name, response).await);
        }

        let body: QdrantResponse<T> = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        Ok(body.result)
    }

    fn to_query_result(point: ScoredPoint, field: Modality) -> StoreResult<QueryResult> {
        let id = match &point.id {
            serde_json::Value::String(s) => Uuid::parse_str(s)
                .map_err(|e| StoreError::InvalidResponse(format!("Bad point id {s}: {e}")))?,
            other => {
                return Err(StoreError::InvalidResponse(format!(
                    "Unexpected point id {other}"
                )))
            }
        };
        let payload = point
            .payload
            .ok_or_else(|| StoreError::InvalidResponse("Search hit without payload".to_string()))?;

        Ok(QueryResult {
            id: RecordId(id),
            caption: payload.caption,
            image_path: payload.image_path,
            score: point.score,
            modality: field,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn backend(&self) -> &str {
        "qdrant"
    }

    async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        let response = self
            .client
            .get(self.collection_url(name, "/exists"))
            .headers(self.build_headers())
            .send()
            .await?;

        let result: ExistsResult = self.parse(name, response).await?;
        Ok(result.exists)
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> StoreResult<()> {
        let body = CreateCollectionRequest {
            vectors: NamedVectorsConfig {
                text: schema.text.into(),
                image: schema.image.into(),
            },
        };

        let response = self
            .client
            .put(self.collection_url(name, ""))
            .headers(self.build_headers())
            .json(&body)
            .send()
            .await?;

        let _: serde_json::Value = self.parse(name, response).await?;
        tracing::info!(collection = name, "Created Qdrant collection");
        Ok(())
    }

    async fn upsert(&self, name: &str, records: Vec<Record>) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let body = UpsertRequest {
            points: records.iter().map(QdrantPoint::from).collect(),
        };

        let response = self
            .client
            .put(self.collection_url(name, "/points?wait=true"))
            .headers(self.build_headers())
            .json(&body)
            .send()
            .await?;

        let _: serde_json::Value = self.parse(name, response).await?;
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        field: Modality,
        query: &Embedding,
        limit: usize,
    ) -> StoreResult<Vec<QueryResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let body = SearchRequest {
            vector: NamedVector {
                name: field.field_name(),
                vector: &query.values,
            },
            limit,
            with_payload: RESULT_PAYLOAD_FIELDS,
        };

        let response = self
            .client
            .post(self.collection_url(name, "/points/search"))
            .headers(self.build_headers())
            .json(&body)
            .send()
            .await?;

        let points: Vec<ScoredPoint> = self.parse(name, response).await?;
        points
            .into_iter()
            .map(|p| Self::to_query_result(p, field))
            .collect()
    }

    async fn count(&self, name: &str) -> StoreResult<usize> {
        let response = self
            .client
            .post(self.collection_url(name, "/points/count"))
            .headers(self.build_headers())
            .json(&CountRequest { exact: true })
            .send()
            .await?;

        let result: CountResult = self.parse(name, response).await?;
        Ok(result.count)
    }
}

/// Maps a failed Qdrant response onto the store's error kinds.
fn error_for_status(name: &str, status: u16, message: String) -> StoreError {
    match status {
        404 => StoreError::CollectionNotFound(name.to_string()),
        409 => StoreError::CollectionExists(name.to_string()),
        _ => StoreError::ApiError { status, message },
    }
}
