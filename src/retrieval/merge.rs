use crate::domain::{MergedContext, QueryResult};

/// Concatenates text results then image results, keeping each list's order.
///
/// No deduplication and no re-ranking: a record found by both searches
/// appears twice, and scores from the two spaces are never compared.
pub fn merge(text_results: Vec<QueryResult>, image_results: Vec<QueryResult>) -> MergedContext {
    let mut merged = text_results;
    merged.extend(image_results);
    MergedContext::new(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Modality, NaturalKey, RecordId};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn result(key: &str, score: f32, modality: Modality) -> QueryResult {
        QueryResult {
            id: RecordId::for_key(&NaturalKey::from(key)),
            caption: key.to_string(),
            image_path: PathBuf::from(format!("/images/{key}.jpg")),
            score,
            modality,
        }
    }

    #[test]
    fn text_first_then_image() {
        let text = vec![result("a", 0.9, Modality::Text), result("b", 0.5, Modality::Text)];
        let image = vec![result("c", 0.99, Modality::Image)];

        let merged = merge(text.clone(), image.clone());

        assert_eq!(merged.len(), 3);
        assert_eq!(&merged.as_slice()[..2], text.as_slice());
        assert_eq!(&merged.as_slice()[2..], image.as_slice());
    }

    #[test]
    fn keeps_duplicates() {
        let merged = merge(
            vec![result("a", 0.9, Modality::Text)],
            vec![result("a", 0.8, Modality::Image)],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.as_slice()[0].id, merged.as_slice()[1].id);
    }

    #[test]
    fn empty_inputs() {
        assert!(merge(Vec::new(), Vec::new()).is_empty());

        let merged = merge(Vec::new(), vec![result("c", 0.1, Modality::Image)]);
        assert_eq!(merged.as_slice()[0].caption, "c");
    }
}
