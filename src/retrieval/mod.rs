//! The retrieval core.
//!
//! - [`IndexBuilder`] - Turns a labeled dataset into a dual-vector collection
//! - [`Retriever`] - Top-k search by text or by image
//! - [`merge`] - Combines both result lists into one context

mod builder;
mod merge;
mod retriever;

pub use builder::{
    BatchError, BatchOutcome, BuildError, BuildReport, IndexBuilder, IndexHandle, SplitOutcome,
    DEFAULT_BATCH_SIZE,
};
pub use merge::merge;
pub use retriever::Retriever;
