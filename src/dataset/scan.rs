//! Split scanning: list images, sample them, join with captions.

use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::dataset::{CaptionTable, DatasetError, SplitLayout};
use crate::domain::{NaturalKey, SplitName};

/// An image matched with its caption, ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCaptionPair {
    pub key: NaturalKey,
    pub caption: String,
    pub image_path: PathBuf,
    pub split: SplitName,
}

/// Everything drawn from one split.
#[derive(Debug, Clone, Default)]
pub struct SplitScan {
    /// Entries found in the images directory.
    pub listed: usize,
    /// Entries drawn by sampling.
    pub sampled: usize,
    /// Sampled images without a caption row.
    pub unmatched: usize,
    /// Sampled images whose file is not on disk.
    pub missing_assets: usize,
    pub pairs: Vec<ImageCaptionPair>,
}

/// Number of items to draw from `n` at `rate`: at least one unless `n` is zero.
pub fn sample_size(n: usize, rate: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let drawn = (n as f64 * rate).floor() as usize;
    drawn.clamp(1, n)
}

/// Lists the non-directory entries of an images directory, sorted by name.
///
/// Symlinks are listed even if dangling; the join reports them as missing.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if !dir.is_dir() {
        return Err(DatasetError::ImagesDirMissing(dir.to_path_buf()));
    }
    let unreadable = |source| DatasetError::ImagesDirUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        if entry.file_type().map_err(unreadable)?.is_dir() {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

/// Draws `sample_size(len, rate)` paths uniformly without replacement.
///
/// The draw is returned in name order so batches are stable for a given sample.
pub fn sample_images<R: Rng + ?Sized>(
    images: &[PathBuf],
    rate: f64,
    rng: &mut R,
) -> Vec<PathBuf> {
    let count = sample_size(images.len(), rate);
    let mut drawn: Vec<PathBuf> = images.choose_multiple(rng, count).cloned().collect();
    drawn.sort();
    drawn
}

/// Natural key of an image: its file name without extension.
pub fn natural_key(path: &Path) -> Option<NaturalKey> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(NaturalKey::from)
}

/// Scans one split: captions, listing, sampling, join.
pub fn scan_split<R: Rng + ?Sized>(
    split: &SplitLayout,
    sample_rate: f64,
    rng: &mut R,
) -> Result<SplitScan, DatasetError> {
    let captions = CaptionTable::load(&split.caption_file)?;
    let listed = list_images(&split.images_dir)?;
    let sampled = sample_images(&listed, sample_rate, rng);

    let mut scan = SplitScan {
        listed: listed.len(),
        sampled: sampled.len(),
        ..Default::default()
    };

    for image_path in sampled {
        let Some(key) = natural_key(&image_path) else {
            scan.unmatched += 1;
            continue;
        };
        let Some(caption) = captions.get(&key) else {
            scan.unmatched += 1;
            continue;
        };
        if !image_path.is_file() {
            let err = DatasetError::AssetMissing(image_path);
            tracing::warn!(split = %split.name, error = %err, "Skipping image");
            scan.missing_assets += 1;
            continue;
        }

        scan.pairs.push(ImageCaptionPair {
            key,
            caption: caption.to_string(),
            image_path,
            split: split.name.clone(),
        });
    }

    tracing::debug!(
        split = %split.name,
        captions = captions.len(),
        listed = scan.listed,
        sampled = scan.sampled,
        matched = scan.pairs.len(),
        unmatched = scan.unmatched,
        missing_assets = scan.missing_assets,
        "Scanned split"
    );

    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, b"not really a jpeg").unwrap();
    }

    fn split_in(dir: &TempDir, captions: &str, images: &[&str]) -> SplitLayout {
        let layout = SplitLayout::rocov2(dir.path(), "train");
        std::fs::write(&layout.caption_file, captions).unwrap();
        std::fs::create_dir_all(&layout.images_dir).unwrap();
        for name in images {
            touch(&layout.images_dir.join(name));
        }
        layout
    }

    #[test]
    fn sample_size_rounds_down_with_floor_of_one() {
        assert_eq!(sample_size(0, 0.5), 0);
        assert_eq!(sample_size(1, 0.5), 1);
        assert_eq!(sample_size(3, 0.5), 1);
        assert_eq!(sample_size(10, 0.5), 5);
        assert_eq!(sample_size(10, 1.0), 10);
        assert_eq!(sample_size(10, 0.01), 1);
    }

    #[test]
    fn list_images_sorted_and_skips_dirs() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.jpg"));
        touch(&dir.path().join("a.jpg"));
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = list_images(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.jpg"), dir.path().join("b.jpg")]
        );
    }

    #[test]
    fn list_images_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = list_images(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, DatasetError::ImagesDirMissing(_)));
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let images: Vec<PathBuf> = (0..20).map(|i| PathBuf::from(format!("{i:02}.jpg"))).collect();

        let first = sample_images(&images, 0.25, &mut StdRng::seed_from_u64(42));
        let second = sample_images(&images, 0.25, &mut StdRng::seed_from_u64(42));

        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
        let mut deduped = first.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), 5);
    }

    #[test]
    fn natural_key_strips_extension() {
        assert_eq!(
            natural_key(Path::new("/x/ROCO_001.jpg")),
            Some(NaturalKey::from("ROCO_001"))
        );
        assert_eq!(
            natural_key(Path::new("/x/scan.v2.png")),
            Some(NaturalKey::from("scan.v2"))
        );
    }

    #[test]
    fn scan_joins_images_with_captions() {
        let dir = TempDir::new().unwrap();
        let layout = split_in(
            &dir,
            "ID,Caption\na,Chest X-ray\nb,Head CT\n",
            &["a.jpg", "b.jpg", "orphan.jpg"],
        );

        let scan = scan_split(&layout, 1.0, &mut StdRng::seed_from_u64(0)).unwrap();

        assert_eq!(scan.listed, 3);
        assert_eq!(scan.sampled, 3);
        assert_eq!(scan.unmatched, 1);
        assert_eq!(scan.missing_assets, 0);
        assert_eq!(scan.pairs.len(), 2);
        assert_eq!(scan.pairs[0].key, NaturalKey::from("a"));
        assert_eq!(scan.pairs[0].caption, "Chest X-ray");
        assert_eq!(scan.pairs[0].split, SplitName::from("train"));
        assert_eq!(scan.pairs[1].image_path, layout.images_dir.join("b.jpg"));
    }

    #[test]
    fn scan_empty_images_dir() {
        let dir = TempDir::new().unwrap();
        let layout = split_in(&dir, "ID,Caption\na,Chest X-ray\n", &[]);

        let scan = scan_split(&layout, 0.5, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(scan.sampled, 0);
        assert!(scan.pairs.is_empty());
    }

    #[test]
    fn scan_missing_caption_table() {
        let dir = TempDir::new().unwrap();
        let layout = SplitLayout::rocov2(dir.path(), "valid");
        std::fs::create_dir_all(&layout.images_dir).unwrap();

        let err = scan_split(&layout, 1.0, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, DatasetError::CaptionTableMissing(_)));
    }

    #[test]
    fn scan_missing_images_dir() {
        let dir = TempDir::new().unwrap();
        let layout = SplitLayout::rocov2(dir.path(), "valid");
        std::fs::write(&layout.caption_file, "ID,Caption\na,x\n").unwrap();

        let err = scan_split(&layout, 1.0, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, DatasetError::ImagesDirMissing(_)));
    }

    #[cfg(unix)]
    #[test]
    fn scan_counts_dangling_links_as_missing() {
        let dir = TempDir::new().unwrap();
        let layout = split_in(&dir, "ID,Caption\na,Chest X-ray\nb,Head CT\n", &["a.jpg"]);
        std::os::unix::fs::symlink(
            dir.path().join("gone.jpg"),
            layout.images_dir.join("b.jpg"),
        )
        .unwrap();

        let scan = scan_split(&layout, 1.0, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(scan.listed, 2);
        assert_eq!(scan.missing_assets, 1);
        assert_eq!(scan.pairs.len(), 1);
        assert_eq!(scan.pairs[0].key, NaturalKey::from("a"));
    }
}
