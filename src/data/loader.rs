// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Reads the evaluation dataset from a JSON file:
//
//   [
//     { "image": "images/0001.jpg", "question": "what color is the ball?",
//       "answer": "red", "category": 3 },
//     ...
//   ]
//
// Relative image paths are resolved against the directory that
// holds the JSON file, so a dataset folder can be moved as a whole.
// `max_examples` keeps only the first N entries.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::error::IqError;
use crate::domain::example::IqExample;
use crate::domain::traits::ExampleSource;

#[derive(Debug, Deserialize)]
struct RawExample {
    image:    String,
    question: String,
    answer:   String,
    category: usize,
}

/// Loads examples from a JSON dataset file.
/// Implements the ExampleSource trait from Layer 3.
pub struct JsonExampleLoader {
    path:         PathBuf,
    max_examples: Option<usize>,
}

impl JsonExampleLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), max_examples: None }
    }

    pub fn with_max_examples(mut self, max_examples: Option<usize>) -> Self {
        self.max_examples = max_examples;
        self
    }

    fn resolve(&self, image: &str) -> String {
        let candidate = Path::new(image);
        if candidate.is_absolute() {
            return image.to_string();
        }
        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        base.join(candidate).to_string_lossy().into_owned()
    }
}

impl ExampleSource for JsonExampleLoader {
    fn load_all(&self) -> Result<Vec<IqExample>> {
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read dataset '{}'", self.path.display()))?;
        let raw: Vec<RawExample> = serde_json::from_str(&json)
            .with_context(|| format!("Malformed dataset file '{}'", self.path.display()))?;

        let limit = self.max_examples.unwrap_or(usize::MAX);
        let examples: Vec<IqExample> = raw
            .into_iter()
            .take(limit)
            .map(|r| IqExample::new(self.resolve(&r.image), r.question, r.answer, r.category))
            .collect();

        if examples.is_empty() {
            return Err(IqError::EmptyDataset(self.path.display().to_string()).into());
        }

        tracing::info!("Loaded {} examples from '{}'", examples.len(), self.path.display());
        Ok(examples)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = r#"[
        {"image": "imgs/a.png", "question": "what color is the ball?", "answer": "red", "category": 2},
        {"image": "/abs/b.png", "question": "is it round?", "answer": "yes", "category": 0},
        {"image": "c.png", "question": "how many?", "answer": "two", "category": 1}
    ]"#;

    fn write_dataset(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("val.json");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_loads_in_file_order_and_resolves_paths() {
        let (dir, path) = write_dataset(DATASET);
        let examples = JsonExampleLoader::new(&path).load_all().unwrap();
        assert_eq!(examples.len(), 3);
        assert_eq!(examples[0].question, "what color is the ball?");
        assert_eq!(examples[0].category, 2);
        assert_eq!(Path::new(&examples[0].image), dir.path().join("imgs/a.png"));
        assert_eq!(examples[1].image, "/abs/b.png");
    }

    #[test]
    fn test_max_examples_truncates() {
        let (_dir, path) = write_dataset(DATASET);
        let examples = JsonExampleLoader::new(&path)
            .with_max_examples(Some(2))
            .load_all()
            .unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1].answer, "yes");
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let (_dir, path) = write_dataset("[]");
        let err = JsonExampleLoader::new(&path).load_all().unwrap_err();
        assert!(matches!(err.downcast_ref::<IqError>(), Some(IqError::EmptyDataset(_))));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = JsonExampleLoader::new("/no/such/val.json").load_all().unwrap_err();
        assert!(err.to_string().contains("/no/such/val.json"));
    }
}
