// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Runs a trained checkpoint over a dataset once and scores the
// generated questions:
//
//   Step 1: Locate checkpoint + sidecar config     (Layer 6 - infra)
//   Step 2: Load vocabulary                        (Layer 6 - infra)
//   Step 3: Rebuild model, load weights            (Layer 5 - ml)
//   Step 4: Load + preprocess examples             (Layer 4 - data)
//   Step 5: Predict batch by batch, in order       (Layer 5 - ml)
//   Step 6: Tokens → words for preds and refs      (Layer 6 - infra)
//   Step 7: Corpus metrics                         (Layer 6 - infra)
//   Step 8: Write results / preds / gts JSON       (Layer 6 - infra)
//
// Nothing is written unless every batch succeeded.

use anyhow::Result;
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::IqBatcher,
    dataset::IqDataset,
    loader::JsonExampleLoader,
    preprocessor::ImagePreprocessor,
};
use crate::domain::{
    error::IqError,
    generation::{EvaluationReport, GenerationMode},
    traits::{ExampleSource, MetricScorer, WordMapper},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    nlg_eval::NlgEval,
    results::ResultWriter,
    vocab_store::Vocabulary,
};
use crate::ml::{decoder::DecodeFunction, host_ints, inferencer::Inferencer, model::DecodeOptions};

// ─── Evaluation Configuration ────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateConfig {
    pub model_path:   String,
    pub dataset:      String,
    pub vocab_path:   String,
    pub results_path: String,
    pub preds_path:   String,
    pub gts_path:     String,
    pub batch_size:   usize,
    pub seed:         u64,
    pub max_examples: Option<usize>,
    pub num_show:     usize,
    pub from_answer:  bool,
    pub decode_fn:    DecodeFunction,
    /// None keeps the checkpoint's own setting
    pub early_stop:   Option<bool>,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            model_path:   "weights/iq.mpk".to_string(),
            dataset:      "data/processed/iq_val_dataset.json".to_string(),
            vocab_path:   "data/processed/vocab_iq.json".to_string(),
            results_path: "results.json".to_string(),
            preds_path:   "preds.json".to_string(),
            gts_path:     "gts.json".to_string(),
            batch_size:   128,
            seed:         1234,
            max_examples: None,
            num_show:     10,
            from_answer:  false,
            decode_fn:    DecodeFunction::LogSoftmax,
            early_stop:   None,
        }
    }
}

pub struct EvaluateUseCase<B: Backend> {
    cfg:    EvaluateConfig,
    device: B::Device,
}

impl<B: Backend> EvaluateUseCase<B> {
    pub fn new(cfg: EvaluateConfig, device: B::Device) -> Self {
        Self { cfg, device }
    }

    /// Full pass: predict, score, write the three result files.
    pub fn execute(&self) -> Result<EvaluationReport> {
        let cfg = &self.cfg;

        // ── Step 1-3: checkpoint, vocabulary, model ──────────────────────────
        let ckpt = CheckpointManager::new(&cfg.model_path);
        let vocab = Vocabulary::load(&cfg.vocab_path)?;
        let mut inferencer = Inferencer::<B>::from_checkpoint(&ckpt, &self.device)?;
        if let Some(early_stop) = cfg.early_stop {
            inferencer = inferencer.with_early_stop(early_stop);
        }
        check_vocabulary(&vocab, &inferencer)?;

        // ── Step 4: dataset ──────────────────────────────────────────────────
        tracing::info!("Building data loader...");
        let examples = JsonExampleLoader::new(&cfg.dataset)
            .with_max_examples(cfg.max_examples)
            .load_all()?;
        let model_cfg = inferencer.config();
        let dataset = IqDataset::from_examples(
            &examples,
            &vocab,
            &ImagePreprocessor::new(model_cfg.image_size),
            model_cfg.max_len,
        )?;

        // ── Step 5-6: predict ────────────────────────────────────────────────
        let report = self.run(&inferencer, dataset, &vocab, &NlgEval::new())?;

        print_samples(&report, cfg.num_show);
        println!("{}", serde_json::to_string(&report.scores)?);
        for (name, score) in &report.scores {
            tracing::info!("{name}: {score:.4}");
        }

        // ── Step 8: persist ──────────────────────────────────────────────────
        ResultWriter::new(ckpt.dir(), &cfg.results_path, &cfg.preds_path, &cfg.gts_path)
            .write(&report)?;
        Ok(report)
    }

    /// Drive the model over `dataset` in loader order and score the output.
    pub fn run(
        &self,
        inferencer: &Inferencer<B>,
        dataset:    IqDataset,
        words:      &dyn WordMapper,
        scorer:     &dyn MetricScorer,
    ) -> Result<EvaluationReport> {
        let cfg = &self.cfg;
        let mode = GenerationMode::from_flag(cfg.from_answer);
        let options = DecodeOptions { teacher_forcing_ratio: 0.0, decode_fn: cfg.decode_fn };
        let batch_size = cfg.batch_size.max(1);
        let num_batches = dataset.sample_count().div_ceil(batch_size);

        let batcher = IqBatcher::<B>::new(self.device.clone(), inferencer.config().image_size);
        let loader = DataLoaderBuilder::new(batcher)
            .batch_size(batch_size)
            .build(dataset);

        tracing::info!("Evaluating {} ({} batches of up to {})", mode, num_batches, batch_size);
        let bar = ProgressBar::new(num_batches as u64);
        if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("#>-"));
        }

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut predictions = Vec::new();
        let mut references = Vec::new();

        for batch in loader.iter() {
            let width = batch.questions.dims()[1];
            let questions = host_ints(batch.questions.clone())?;
            let tokens = inferencer.predict(batch, mode, options, &mut rng)?;
            let max_len = tokens.dims()[1];

            predictions.extend(rows_to_words(words, &host_ints(tokens)?, max_len));
            references.extend(rows_to_words(words, &questions, width));
            bar.inc(1);
        }
        bar.finish_and_clear();

        let reference_sets: Vec<Vec<String>> = references.iter().map(|r| vec![r.clone()]).collect();
        let scores = scorer.compute_metrics(&reference_sets, &predictions);
        Ok(EvaluationReport { scores, predictions, references })
    }
}

/// The vocabulary must fit the embedding tables and agree on the
/// start/end ids the model was built with.
fn check_vocabulary<B: Backend>(vocab: &Vocabulary, inferencer: &Inferencer<B>) -> Result<()> {
    let cfg = inferencer.config();
    if vocab.len() > cfg.vocab_size {
        return Err(IqError::ConfigMismatch(format!(
            "vocabulary has {} entries but the model was built for {}",
            vocab.len(),
            cfg.vocab_size,
        ))
        .into());
    }
    if vocab.sos_id() as usize != cfg.sos_id || vocab.eos_id() as usize != cfg.eos_id {
        return Err(IqError::ConfigMismatch(format!(
            "vocabulary start/end ids ({}, {}) differ from the model's ({}, {})",
            vocab.sos_id(),
            vocab.eos_id(),
            cfg.sos_id,
            cfg.eos_id,
        ))
        .into());
    }
    Ok(())
}

/// Split a row-major [rows, width] id buffer into sentences.
pub fn rows_to_words(words: &dyn WordMapper, ids: &[i64], width: usize) -> Vec<String> {
    if width == 0 {
        return Vec::new();
    }
    ids.chunks(width)
        .map(|row| {
            let row: Vec<u32> = row.iter().map(|&t| t.max(0) as u32).collect();
            words.tokens_to_words(&row)
        })
        .collect()
}

fn print_samples(report: &EvaluationReport, num_show: usize) {
    let n = num_show.min(report.references.len());
    println!("{}", "=".repeat(80));
    println!("GROUND TRUTH");
    println!("{:?}", &report.references[..n]);
    println!("{}", "-".repeat(80));
    println!("PREDICTIONS");
    println!("{:?}", &report.predictions[..n.min(report.predictions.len())]);
    println!("{}", "=".repeat(80));
}
