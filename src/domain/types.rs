//! Core identifier types for indexed entities.
//!
//! These newtype wrappers keep record identifiers, natural keys and split
//! names from being mixed up with arbitrary strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace for deriving record ids from natural keys.
///
/// Changing this value changes every record id, so existing persistent
/// collections would stop deduplicating against new builds.
pub const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_567812345678);

/// Dataset-provided identifier of an image (its filename stem).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey(pub String);

impl NaturalKey {
    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NaturalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NaturalKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Stable identifier of a record in a collection.
///
/// Always derived from a [`NaturalKey`], so rebuilding an index from the same
/// source data yields the same ids and upserts overwrite instead of duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Derives the record id for a natural key.
    pub fn for_key(key: &NaturalKey) -> Self {
        Self(Uuid::new_v5(&RECORD_NAMESPACE, key.as_str().as_bytes()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of the dataset subset a record came from (e.g. `train`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitName(pub String);

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SplitName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SplitName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
