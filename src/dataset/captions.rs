//! Caption table loading.
//!
//! A caption table is a CSV file mapping image ids to captions. Files with a
//! recognised header row are read by column name; anything else is read as
//! headerless with the id in column 0 and the caption in column 1.

use std::collections::HashMap;
use std::path::Path;

use crate::dataset::DatasetError;
use crate::domain::NaturalKey;

const ID_HEADERS: [&str; 3] = ["id", "image_id", "imageid"];
const CAPTION_HEADERS: [&str; 2] = ["caption", "text"];

/// Captions keyed by image id.
#[derive(Debug, Clone, Default)]
pub struct CaptionTable {
    captions: HashMap<NaturalKey, String>,
    duplicates: usize,
    short_rows: usize,
}

impl CaptionTable {
    /// Loads a caption table from disk.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        if !path.is_file() {
            return Err(DatasetError::CaptionTableMissing(path.to_path_buf()));
        }
        let raw = std::fs::read(path).map_err(|source| DatasetError::CaptionTableUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Parses CSV bytes; `source` is only used in error messages.
    pub fn parse(raw: &[u8], source: &Path) -> Result<Self, DatasetError> {
        let malformed = |reason: String| DatasetError::CaptionTableMalformed {
            path: source.to_path_buf(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(raw);

        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| malformed(e.to_string()))?;

        let Some(first) = rows.first() else {
            return Err(malformed("no rows".to_string()));
        };

        let (id_col, caption_col, data) = match header_columns(first) {
            Some((id_col, caption_col)) => (id_col, caption_col, &rows[1..]),
            None => {
                if first.len() < 2 {
                    return Err(malformed(format!(
                        "expected at least 2 columns, found {}",
                        first.len()
                    )));
                }
                (0, 1, &rows[..])
            }
        };

        let mut table = CaptionTable::default();
        for row in data {
            let (Some(id), Some(caption)) = (row.get(id_col), row.get(caption_col)) else {
                table.short_rows += 1;
                continue;
            };
            let id = id.trim();
            if id.is_empty() {
                table.short_rows += 1;
                continue;
            }

            // First row wins on duplicate ids
            let key = NaturalKey::from(id);
            if table.captions.contains_key(&key) {
                table.duplicates += 1;
                continue;
            }
            table.captions.insert(key, caption.trim().to_string());
        }

        if table.duplicates > 0 || table.short_rows > 0 {
            tracing::debug!(
                path = %source.display(),
                duplicates = table.duplicates,
                short_rows = table.short_rows,
                "Ignored caption rows"
            );
        }

        Ok(table)
    }

    pub fn get(&self, key: &NaturalKey) -> Option<&str> {
        self.captions.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.captions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captions.is_empty()
    }

    /// Rows dropped because their id was already present.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// Finds the id and caption columns in a header row, if it is one.
fn header_columns(row: &csv::StringRecord) -> Option<(usize, usize)> {
    let find = |names: &[&str]| {
        row.iter()
            .position(|field| names.contains(&field.trim().to_lowercase().as_str()))
    };
    Some((find(&ID_HEADERS)?, find(&CAPTION_HEADERS)?))
}
