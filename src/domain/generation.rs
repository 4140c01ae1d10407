// ============================================================
// Layer 3 — Generation Modes and Evaluation Report
// ============================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metric name → score, ordered by name so result files are stable.
pub type Scores = BTreeMap<String, f64>;

/// What the question decoder is conditioned on besides the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationMode {
    /// Condition on the ground-truth answer sequence
    FromAnswer,
    /// Condition on the answer category id only
    FromCategory,
}

impl GenerationMode {
    pub fn from_flag(from_answer: bool) -> Self {
        if from_answer { Self::FromAnswer } else { Self::FromCategory }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FromAnswer   => write!(f, "from-answer"),
            Self::FromCategory => write!(f, "from-category"),
        }
    }
}

/// Everything a full evaluation pass produces.
/// `predictions[i]` and `references[i]` describe the same example.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub scores:      Scores,
    pub predictions: Vec<String>,
    pub references:  Vec<String>,
}
