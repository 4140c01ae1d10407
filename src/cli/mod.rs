// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `evaluate` — generate questions with a checkpoint and score them
//   2. `init`     — write a freshly initialised checkpoint
//
// Both pick the tensor backend at runtime (--backend wgpu|ndarray)
// and hand the matching device to a generic use case.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu};
use clap::Parser;
use commands::{BackendKind, Commands, EvaluateArgs, InitArgs};
use std::path::PathBuf;

use crate::application::{
    evaluate_use_case::{EvaluateConfig, EvaluateUseCase},
    init_use_case::{InitConfig, InitUseCase},
};
use crate::infra::{checkpoint::CheckpointManager, logging::EVAL_LOG};

#[derive(Parser, Debug)]
#[command(
    name = "iq-qgen",
    version = "0.1.0",
    about = "Generate visual questions from images and answer categories, then score them."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Where this invocation's log file goes, if anywhere.
    /// Evaluation logs to eval.log beside the checkpoint.
    pub fn log_file(&self) -> Option<PathBuf> {
        match &self.command {
            Commands::Evaluate(args) => Some(CheckpointManager::new(&args.model_path).dir().join(EVAL_LOG)),
            Commands::Init(_) => None,
        }
    }

    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Init(args)     => run_init(args),
        }
    }
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    tracing::info!("evaluate {}", serde_json::to_string(&args)?);
    let backend = args.backend;
    let cfg: EvaluateConfig = args.into();

    match backend {
        BackendKind::Wgpu => {
            EvaluateUseCase::<Wgpu>::new(cfg, WgpuDevice::default()).execute()?;
        }
        BackendKind::Ndarray => {
            EvaluateUseCase::<NdArray>::new(cfg, NdArrayDevice::Cpu).execute()?;
        }
    }
    Ok(())
}

fn run_init(args: InitArgs) -> Result<()> {
    tracing::info!("init {}", serde_json::to_string(&args)?);
    let backend = args.backend;
    let cfg: InitConfig = args.into();

    let model_cfg = match backend {
        BackendKind::Wgpu    => InitUseCase::<Wgpu>::new(cfg, WgpuDevice::default()).execute()?,
        BackendKind::Ndarray => InitUseCase::<NdArray>::new(cfg, NdArrayDevice::Cpu).execute()?,
    };
    println!("Checkpoint initialised for a vocabulary of {} words.", model_cfg.vocab_size);
    Ok(())
}
