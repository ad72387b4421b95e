//! Vector index stores.
//!
//! A collection holds dual-vector records: every record has a `text` vector
//! (caption embedding) and an `image` vector, each searched independently.
//!
//! # Backends
//!
//! - [`InMemoryIndex`]: process-local, rebuilt on every start
//! - [`QdrantIndex`]: a Qdrant server reached over REST

mod memory;
mod qdrant;
mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use memory::InMemoryIndex;
pub use qdrant::{QdrantIndex, QDRANT_DEFAULT_URL};
pub use traits::{
    CollectionSchema, Distance, StoreError, StoreResult, VectorIndex, VectorParams,
};

use crate::config::{IndexSettings, StoreBackend};

/// Builds the store selected in settings.
///
/// `api_key` is only used by remote backends.
pub fn index_from_settings(
    settings: &IndexSettings,
    api_key: Option<String>,
) -> StoreResult<Arc<dyn VectorIndex>> {
    match &settings.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryIndex::new())),
        StoreBackend::Qdrant { url, .. } => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.timeout_secs))
                .build()?;
            tracing::info!(url = %url, authenticated = api_key.is_some(), "Using Qdrant store");
            Ok(Arc::new(QdrantIndex::new(url.as_str(), api_key).with_client(client)))
        }
    }
}
