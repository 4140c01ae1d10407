// ============================================================
// Layer 2 — InitUseCase
// ============================================================
// Writes a freshly initialised checkpoint that evaluate can load:
//
//   Step 1: Load vocabulary                 (Layer 6 - infra)
//   Step 2: Size the architecture from it   (Layer 5 - ml)
//   Step 3: Build the model on the device   (Layer 5 - ml)
//   Step 4: Save weights + model_config.json (Layer 6 - infra)
//
// Weights are random, so the generated questions are noise. The
// checkpoint is useful for smoke-testing the pipeline and for
// checking that an architecture fits in memory.

use anyhow::Result;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::infra::{checkpoint::CheckpointManager, vocab_store::Vocabulary};
use crate::ml::{model::IqConfig, recurrent::RnnCell};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    pub model_path:     String,
    pub vocab_path:     String,
    pub seed:           u64,
    pub max_len:        usize,
    pub hidden_size:    usize,
    pub num_layers:     usize,
    pub rnn_cell:       RnnCell,
    pub num_categories: usize,
    pub z_size:         usize,
    pub image_size:     usize,
    pub bayes:          bool,
    pub image_recon:    bool,
    pub category_space: bool,
    pub early_stop:     bool,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            model_path:     "weights/iq.mpk".to_string(),
            vocab_path:     "data/processed/vocab_iq.json".to_string(),
            seed:           1234,
            max_len:        20,
            hidden_size:    512,
            num_layers:     1,
            rnn_cell:       RnnCell::Lstm,
            num_categories: 16,
            z_size:         64,
            image_size:     224,
            bayes:          false,
            image_recon:    true,
            category_space: true,
            early_stop:     false,
        }
    }
}

impl InitConfig {
    /// Architecture for `vocab`, everything not exposed here at its default.
    pub fn model_config(&self, vocab: &Vocabulary) -> IqConfig {
        IqConfig::new(vocab.len(), vocab.sos_id() as usize, vocab.eos_id() as usize)
            .with_max_len(self.max_len)
            .with_hidden_size(self.hidden_size)
            .with_num_layers(self.num_layers)
            .with_rnn_cell(self.rnn_cell)
            .with_num_categories(self.num_categories)
            .with_z_size(self.z_size)
            .with_image_size(self.image_size)
            .with_bayes(self.bayes)
            .with_image_recon(self.image_recon)
            .with_category_space(self.category_space)
            .with_early_stop(self.early_stop)
    }
}

pub struct InitUseCase<B: Backend> {
    cfg:    InitConfig,
    device: B::Device,
}

impl<B: Backend> InitUseCase<B> {
    pub fn new(cfg: InitConfig, device: B::Device) -> Self {
        Self { cfg, device }
    }

    pub fn execute(&self) -> Result<IqConfig> {
        let cfg = &self.cfg;
        let vocab = Vocabulary::load(&cfg.vocab_path)?;
        let model_cfg = self.cfg.model_config(&vocab);
        model_cfg.validate()?;

        B::seed(cfg.seed);
        let model = model_cfg.init::<B>(&self.device);
        tracing::info!(
            "Initialised model: vocab {}, {} parameters",
            model_cfg.vocab_size,
            model.num_params(),
        );

        let ckpt = CheckpointManager::new(&cfg.model_path);
        ckpt.save_config(&model_cfg)?;
        ckpt.save_model(&model)?;
        tracing::info!("Checkpoint written to '{}'", ckpt.weights_path().display());
        Ok(model_cfg)
    }
}
