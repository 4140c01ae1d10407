// ============================================================
// Layer 4 — IQ Dataset
// ============================================================
// Holds fully preprocessed samples and implements burn's Dataset
// trait so the DataLoader can index into it.
//
// Sequence layouts (width max_len):
//   question: <start> w1 .. wn <end> <pad> ...
//   answer:   w1 .. wn <end> <pad> ...
//
// Images are decoded once, here, so a broken file fails the run
// before any batch is produced.

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::preprocessor::{clean_text, ImagePreprocessor};
use crate::domain::example::IqExample;
use crate::infra::vocab_store::Vocabulary;

/// One tokenised, padded and image-decoded sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IqSample {
    /// Normalised CHW pixels, 3 · size · size floats
    pub image:           Vec<f32>,
    pub question:        Vec<u32>,
    pub question_length: usize,
    pub answer:          Vec<u32>,
    pub answer_length:   usize,
    pub category:        usize,
}

pub struct IqDataset {
    samples: Vec<IqSample>,
}

impl IqDataset {
    pub fn new(samples: Vec<IqSample>) -> Self { Self { samples } }

    /// Tokenise and decode every example, keeping file order.
    pub fn from_examples(
        examples:     &[IqExample],
        vocab:        &Vocabulary,
        preprocessor: &ImagePreprocessor,
        max_len:      usize,
    ) -> Result<Self> {
        let samples = examples
            .iter()
            .enumerate()
            .map(|(i, ex)| {
                build_sample(ex, vocab, preprocessor, max_len)
                    .with_context(|| format!("Cannot prepare example #{i} ('{}')", ex.image))
            })
            .collect::<Result<Vec<_>>>()?;
        let dataset = Self { samples };
        tracing::debug!(
            "Prepared {} samples (max_len = {}), {} question words out of vocabulary",
            dataset.sample_count(),
            max_len,
            dataset.unknown_question_words(vocab.unk_id()),
        );
        Ok(dataset)
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    /// Question tokens mapped to `unk_id`, counting only the unpadded part.
    pub fn unknown_question_words(&self, unk_id: u32) -> usize {
        self.samples
            .iter()
            .map(|s| s.question[..s.question_length.min(s.question.len())].iter().filter(|&&t| t == unk_id).count())
            .sum()
    }
}

fn build_sample(
    example:      &IqExample,
    vocab:        &Vocabulary,
    preprocessor: &ImagePreprocessor,
    max_len:      usize,
) -> Result<IqSample> {
    let (question, question_length) = vocab.encode_padded(&clean_text(&example.question), max_len, true)?;
    let (answer, answer_length) = vocab.encode_padded(&clean_text(&example.answer), max_len, false)?;
    let image = preprocessor.load(Path::new(&example.image))?;
    Ok(IqSample {
        image,
        question,
        question_length,
        answer,
        answer_length,
        category: example.category,
    })
}

impl Dataset<IqSample> for IqDataset {
    fn get(&self, index: usize) -> Option<IqSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
