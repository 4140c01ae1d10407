// ============================================================
// Layer 3 — IqExample Domain Type
// ============================================================
// A single annotated example as it appears in a dataset file:
//   - the image the question is about
//   - the reference question (what we try to generate)
//   - the answer to that question
//   - the answer category ("color", "count", ...) as an integer id
//
// Example:
//   image:    "images/000123.jpg"
//   question: "what color is the bus?"
//   answer:   "red"
//   category: 3

use serde::{Deserialize, Serialize};

/// A raw, untokenised dataset record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IqExample {
    /// Path to the image file. Relative paths are resolved against
    /// the directory holding the dataset file.
    pub image: String,

    /// The ground-truth question text
    pub question: String,

    /// The ground-truth answer text
    pub answer: String,

    /// Answer category id in `[0, num_categories)`
    pub category: usize,
}

impl IqExample {
    pub fn new(
        image:    impl Into<String>,
        question: impl Into<String>,
        answer:   impl Into<String>,
        category: usize,
    ) -> Self {
        Self {
            image:    image.into(),
            question: question.into(),
            answer:   answer.into(),
            category,
        }
    }
}
