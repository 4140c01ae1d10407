// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `evaluate` and `init`, and all
// their configurable flags.
//
// clap's derive macros generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, DecodeFunction, RnnCell, ...)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;

use crate::application::{evaluate_use_case::EvaluateConfig, init_use_case::InitConfig};
use crate::infra::results::{DEFAULT_GTS, DEFAULT_PREDS, DEFAULT_RESULTS};
use crate::ml::{decoder::DecodeFunction, recurrent::RnnCell};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate questions for a dataset with a trained checkpoint and score them
    Evaluate(EvaluateArgs),

    /// Write a randomly initialised checkpoint for a vocabulary
    Init(InitArgs),
}

/// Tensor backend the model runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU through wgpu
    #[default]
    Wgpu,
    /// CPU through ndarray
    Ndarray,
}

#[derive(Args, Debug, Serialize)]
pub struct EvaluateArgs {
    /// Weights file; model_config.json must sit in the same directory
    #[arg(long, default_value = "weights/iq.mpk")]
    pub model_path: String,

    /// Metrics file name, written next to the weights
    #[arg(long, default_value = DEFAULT_RESULTS)]
    pub results_path: String,

    /// Predicted questions file name
    #[arg(long, default_value = DEFAULT_PREDS)]
    pub preds_path: String,

    /// Reference questions file name
    #[arg(long, default_value = DEFAULT_GTS)]
    pub gts_path: String,

    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Seeds every stochastic choice of the run
    #[arg(long, default_value_t = 1234)]
    pub seed: u64,

    /// Only evaluate the first N examples
    #[arg(long)]
    pub max_examples: Option<usize>,

    /// How many predictions and references to print
    #[arg(long, default_value_t = 10)]
    pub num_show: usize,

    /// Condition on the answer text instead of the answer category
    #[arg(long)]
    pub from_answer: bool,

    #[arg(long, default_value = "data/processed/vocab_iq.json")]
    pub vocab_path: String,

    #[arg(long, default_value = "data/processed/iq_val_dataset.json")]
    pub dataset: String,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,

    /// Applied to the decoder scores each step: log-softmax, softmax or identity
    #[arg(long, default_value_t = DecodeFunction::LogSoftmax)]
    pub decode_fn: DecodeFunction,

    /// Stop decoding once every sequence has produced <end>; unset keeps the checkpoint's choice
    #[arg(long)]
    pub early_stop: Option<bool>,
}

/// The application layer never sees clap types.
impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            model_path:   a.model_path,
            dataset:      a.dataset,
            vocab_path:   a.vocab_path,
            results_path: a.results_path,
            preds_path:   a.preds_path,
            gts_path:     a.gts_path,
            batch_size:   a.batch_size,
            seed:         a.seed,
            max_examples: a.max_examples,
            num_show:     a.num_show,
            from_answer:  a.from_answer,
            decode_fn:    a.decode_fn,
            early_stop:   a.early_stop,
        }
    }
}

#[derive(Args, Debug, Serialize)]
pub struct InitArgs {
    /// Where to write the weights; model_config.json goes next to them
    #[arg(long, default_value = "weights/iq.mpk")]
    pub model_path: String,

    #[arg(long, default_value = "data/processed/vocab_iq.json")]
    pub vocab_path: String,

    #[arg(long, default_value_t = 1234)]
    pub seed: u64,

    #[arg(long, default_value_t = 20)]
    pub max_len: usize,

    #[arg(long, default_value_t = 512)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 1)]
    pub num_layers: usize,

    /// LSTM or GRU
    #[arg(long, default_value = "LSTM")]
    pub rnn_cell: RnnCell,

    #[arg(long, default_value_t = 16)]
    pub num_categories: usize,

    #[arg(long, default_value_t = 64)]
    pub z_size: usize,

    #[arg(long, default_value_t = 224)]
    pub image_size: usize,

    /// Scale the latent noise by the learned per-dimension alpha
    #[arg(long)]
    pub bayes: bool,

    /// Leave out the image reconstruction head
    #[arg(long)]
    pub no_image_recon: bool,

    /// Build without the category feature space
    #[arg(long)]
    pub no_category_space: bool,

    #[arg(long)]
    pub early_stop: bool,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

impl From<InitArgs> for InitConfig {
    fn from(a: InitArgs) -> Self {
        InitConfig {
            model_path:     a.model_path,
            vocab_path:     a.vocab_path,
            seed:           a.seed,
            max_len:        a.max_len,
            hidden_size:    a.hidden_size,
            num_layers:     a.num_layers,
            rnn_cell:       a.rnn_cell,
            num_categories: a.num_categories,
            z_size:         a.z_size,
            image_size:     a.image_size,
            bayes:          a.bayes,
            image_recon:    !a.no_image_recon,
            category_space: !a.no_category_space,
            early_stop:     a.early_stop,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_evaluate_defaults() {
        let cli = Cli::try_parse_from(["iq-qgen", "evaluate"]).unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        assert_eq!(args.backend, BackendKind::Wgpu);
        assert_eq!(args.decode_fn, DecodeFunction::LogSoftmax);
        assert_eq!(args.early_stop, None);

        let cfg: EvaluateConfig = args.into();
        assert_eq!(cfg.batch_size, 128);
        assert_eq!(cfg.seed, 1234);
        assert_eq!(cfg.results_path, "results.json");
        assert!(!cfg.from_answer);
    }

    #[test]
    fn test_evaluate_flags() {
        let cli = Cli::try_parse_from([
            "iq-qgen", "evaluate",
            "--from-answer",
            "--backend", "ndarray",
            "--decode-fn", "softmax",
            "--early-stop", "true",
            "--max-examples", "50",
        ])
        .unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        assert_eq!(args.backend, BackendKind::Ndarray);

        let cfg: EvaluateConfig = args.into();
        assert!(cfg.from_answer);
        assert_eq!(cfg.decode_fn, DecodeFunction::Softmax);
        assert_eq!(cfg.early_stop, Some(true));
        assert_eq!(cfg.max_examples, Some(50));
    }

    #[test]
    fn test_unknown_decode_fn_is_rejected() {
        assert!(Cli::try_parse_from(["iq-qgen", "evaluate", "--decode-fn", "argmax"]).is_err());
    }

    #[test]
    fn test_init_flags() {
        let cli = Cli::try_parse_from([
            "iq-qgen", "init", "--rnn-cell", "gru", "--no-category-space", "--z-size", "16",
        ])
        .unwrap();
        let Commands::Init(args) = cli.command else { panic!("expected init") };
        let cfg: InitConfig = args.into();
        assert_eq!(cfg.rnn_cell, RnnCell::Gru);
        assert!(!cfg.category_space);
        assert!(cfg.image_recon);
        assert_eq!(cfg.z_size, 16);
    }
}
