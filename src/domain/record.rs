//! Indexed records and the shapes retrieval hands back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::{NaturalKey, RecordId, SplitName};
use crate::embedding::Embedding;

/// Reasons a record cannot be constructed.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("{modality} vector for {key} is empty")]
    EmptyVector { key: NaturalKey, modality: Modality },

    #[error("{modality} vector for {key} contains a non-finite value")]
    NonFiniteVector { key: NaturalKey, modality: Modality },
}

/// One of the two input kinds handled by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    /// Name of the vector field holding this modality's embeddings.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Metadata stored alongside a record's vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Natural key of the source image.
    pub image_id: NaturalKey,
    /// Original caption text.
    pub caption: String,
    /// Location of the image bytes on disk.
    pub image_path: PathBuf,
    /// Dataset subset the pair was drawn from.
    pub split: SplitName,
}

/// A retrievable (image, caption) pair with both embeddings.
///
/// Fields are private so a record can only exist with both vectors present
/// and finite.
#[derive(Debug, Clone)]
pub struct Record {
    id: RecordId,
    text_vector: Embedding,
    image_vector: Embedding,
    payload: RecordPayload,
}

impl Record {
    /// Builds a record, deriving its id from the payload's natural key.
    pub fn new(
        payload: RecordPayload,
        text_vector: Embedding,
        image_vector: Embedding,
    ) -> Result<Self, RecordError> {
        check_vector(&payload.image_id, Modality::Text, &text_vector)?;
        check_vector(&payload.image_id, Modality::Image, &image_vector)?;

        Ok(Self {
            id: RecordId::for_key(&payload.image_id),
            text_vector,
            image_vector,
            payload,
        })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn payload(&self) -> &RecordPayload {
        &self.payload
    }

    pub fn text_vector(&self) -> &Embedding {
        &self.text_vector
    }

    pub fn image_vector(&self) -> &Embedding {
        &self.image_vector
    }

    /// Returns the vector stored for the given modality.
    pub fn vector(&self, modality: Modality) -> &Embedding {
        match modality {
            Modality::Text => &self.text_vector,
            Modality::Image => &self.image_vector,
        }
    }
}

fn check_vector(key: &NaturalKey, modality: Modality, vector: &Embedding) -> Result<(), RecordError> {
    if vector.values.is_empty() {
        return Err(RecordError::EmptyVector {
            key: key.clone(),
            modality,
        });
    }
    if vector.values.iter().any(|v| !v.is_finite()) {
        return Err(RecordError::NonFiniteVector {
            key: key.clone(),
            modality,
        });
    }
    Ok(())
}

/// A retrieved record's caption and image reference with its similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: RecordId,
    pub caption: String,
    pub image_path: PathBuf,
    /// Similarity to the query within the searched vector field.
    pub score: f32,
    /// Which vector field produced this hit.
    pub modality: Modality,
}

impl QueryResult {
    /// File name of the referenced image, used when citing sources.
    pub fn source_name(&self) -> String {
        self.image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image_path.display().to_string())
    }
}

/// Ordered retrieval context handed to generation.
///
/// Text hits come first in their own rank order, followed by image hits in
/// theirs. Scores from different fields are never compared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedContext(Vec<QueryResult>);

impl MergedContext {
    pub fn new(results: Vec<QueryResult>) -> Self {
        Self(results)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryResult> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[QueryResult] {
        &self.0
    }
}
