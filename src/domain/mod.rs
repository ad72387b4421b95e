//! Domain layer types for medrag.
//!
//! This module contains the core types shared by index construction,
//! retrieval and generation: record identifiers, dual-vector records and the
//! result shapes returned by searches.

mod record;
mod types;

pub use record::{MergedContext, Modality, QueryResult, Record, RecordError, RecordPayload};
pub use types::{NaturalKey, RecordId, SplitName, RECORD_NAMESPACE};
