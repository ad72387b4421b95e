//! Where each split's caption table and images live.

use std::path::{Path, PathBuf};

use crate::domain::SplitName;

/// Split names of the ROCOv2 radiology dataset, in scan order.
pub const ROCOV2_SPLITS: [&str; 3] = ["test", "train", "valid"];

/// Resolved paths for one dataset split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLayout {
    pub name: SplitName,
    pub caption_file: PathBuf,
    pub images_dir: PathBuf,
}

impl SplitLayout {
    /// `<root>/<split>_captions.csv` and `<root>/<split>_images/<split>/`.
    pub fn rocov2(root: &Path, name: &str) -> Self {
        Self {
            name: SplitName::from(name),
            caption_file: root.join(format!("{name}_captions.csv")),
            images_dir: root.join(format!("{name}_images")).join(name),
        }
    }
}

/// An ordered set of splits under a dataset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    root: PathBuf,
    splits: Vec<SplitLayout>,
}

impl DatasetLayout {
    pub fn new(root: &Path, splits: Vec<SplitLayout>) -> Self {
        Self {
            root: root.to_path_buf(),
            splits,
        }
    }

    /// The default three-split ROCOv2 layout under `root`.
    pub fn rocov2(root: &Path) -> Self {
        Self::new(
            root,
            ROCOV2_SPLITS
                .iter()
                .map(|name| SplitLayout::rocov2(root, name))
                .collect(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn splits(&self) -> &[SplitLayout] {
        &self.splits
    }
}
