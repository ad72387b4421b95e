//! Labeled image/caption datasets.
//!
//! A dataset is a root directory with one or more splits. Each split pairs a
//! caption table with a directory of images; the file stem of an image is
//! the id it is looked up by in the table.

mod captions;
mod layout;
mod scan;

use std::path::PathBuf;
use thiserror::Error;

pub use captions::CaptionTable;
pub use layout::{DatasetLayout, SplitLayout, ROCOV2_SPLITS};
pub use scan::{
    list_images, natural_key, sample_images, sample_size, scan_split, ImageCaptionPair, SplitScan,
};

/// Problems with the source data. Each one skips a split or a single image.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("caption table not found: {0}")]
    CaptionTableMissing(PathBuf),

    #[error("failed to read caption table {path}: {source}")]
    CaptionTableUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed caption table {path}: {reason}")]
    CaptionTableMalformed { path: PathBuf, reason: String },

    #[error("images directory not found: {0}")]
    ImagesDirMissing(PathBuf),

    #[error("failed to read images directory {path}: {source}")]
    ImagesDirUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("image file not found: {0}")]
    AssetMissing(PathBuf),
}
