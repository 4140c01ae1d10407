// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The evaluation use case only talks to these traits, so the
// dataset format, vocabulary backend and metric implementation
// can each be swapped without touching the evaluation loop.

use anyhow::Result;

use crate::domain::example::IqExample;
use crate::domain::generation::Scores;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can produce annotated examples.
///
/// Implementations:
///   - JsonExampleLoader → reads a JSON dataset file
pub trait ExampleSource {
    /// Load every example, in file order.
    fn load_all(&self) -> Result<Vec<IqExample>>;
}

// ─── WordMapper ───────────────────────────────────────────────────────────────
/// Bidirectional token id ↔ word mapping.
///
/// Implementations:
///   - Vocabulary → WordLevel tokenizer built from a vocab JSON
pub trait WordMapper {
    /// Turn text into token ids (no reserved symbols added).
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Turn a token sequence into a sentence. Stops at the end symbol
    /// and drops padding and start symbols.
    fn tokens_to_words(&self, tokens: &[u32]) -> String;
}

// ─── MetricScorer ─────────────────────────────────────────────────────────────
/// Corpus-level comparison of generated text against references.
///
/// Implementations:
///   - NlgEval → BLEU, METEOR, ROUGE-L, CIDEr, distinct-n
pub trait MetricScorer {
    /// `references[i]` holds every acceptable reference for `hypotheses[i]`.
    fn compute_metrics(&self, references: &[Vec<String>], hypotheses: &[String]) -> Scores;
}
