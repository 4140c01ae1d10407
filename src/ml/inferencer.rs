// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the IQ model from a checkpoint and turns batches into
// generated token ids.
//
// Every batch is validated before the encoders see it:
//   - at least one example
//   - images are [batch, 3, H, W]
//   - all tensors agree on the batch size
//   - category ids lie in [0, num_categories)
// A violation is an IqError::MalformedBatch and aborts the run.
//
// The backend is generic. Evaluation runs on a non-autodiff
// backend, where dropout is inactive and no graph is recorded.

use anyhow::Result;
use burn::prelude::*;
use rand::Rng;

use crate::data::batcher::IqBatch;
use crate::domain::error::IqError;
use crate::domain::generation::GenerationMode;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::host_ints;
use crate::ml::model::{DecodeOptions, IqConfig, IqModel};

pub struct Inferencer<B: Backend> {
    model:  IqModel<B>,
    config: IqConfig,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(model: IqModel<B>, config: IqConfig) -> Self {
        Self { model, config }
    }

    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, device: &B::Device) -> Result<Self> {
        let config = ckpt_manager.load_config()?;
        config.validate()?;
        let model: IqModel<B> = config.init(device);
        let model = ckpt_manager.load_model(model, device)?;
        tracing::info!(
            "Model ready: {} {} layer(s), hidden {}, z {}, category space {}, bayes {}",
            config.num_layers, format!("{:?}", config.rnn_cell).to_uppercase(),
            config.hidden_size, config.z_size, config.category_space, config.bayes,
        );
        tracing::info!(
            "Parameters: {} total, {} cycle, {} info",
            model.num_params(),
            model.cycle_param_count(),
            model.info_param_count(),
        );
        Ok(Self::new(model, config))
    }

    /// Override the checkpoint's early-stop setting.
    pub fn with_early_stop(mut self, early_stop: bool) -> Self {
        self.model.decoder.early_stop = early_stop;
        self.config.early_stop = early_stop;
        self
    }

    pub fn config(&self) -> &IqConfig { &self.config }

    pub fn model(&self) -> &IqModel<B> { &self.model }

    /// Reject batches the model cannot consume.
    pub fn validate(&self, batch: &IqBatch<B>) -> Result<()> {
        let malformed = |msg: String| -> anyhow::Error { IqError::MalformedBatch(msg).into() };

        let n = batch.batch_size();
        let [_, channels, _, _] = batch.images.dims();
        if n == 0 {
            return Err(malformed("batch is empty".to_string()));
        }
        if channels != 3 {
            return Err(malformed(format!("images have {channels} channels, expected 3")));
        }

        let sizes = [
            ("images", batch.images.dims()[0]),
            ("questions", batch.questions.dims()[0]),
            ("question_lengths", batch.question_lengths.dims()[0]),
            ("answers", batch.answers.dims()[0]),
            ("answer_lengths", batch.answer_lengths.dims()[0]),
        ];
        if let Some((name, size)) = sizes.iter().find(|(_, size)| *size != n) {
            return Err(malformed(format!("{name} has batch size {size}, categories have {n}")));
        }

        let limit = self.config.num_categories as i64;
        let categories = host_ints(batch.categories.clone())?;
        if let Some(bad) = categories.iter().find(|&&c| c < 0 || c >= limit) {
            return Err(malformed(format!("category id {bad} outside [0, {limit})")));
        }
        Ok(())
    }

    /// Generate token ids [batch, max_len] for one batch.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        batch:   IqBatch<B>,
        mode:    GenerationMode,
        options: DecodeOptions,
        rng:     &mut R,
    ) -> Result<Tensor<B, 2, Int>> {
        self.validate(&batch)?;
        match mode {
            GenerationMode::FromCategory => {
                self.model.predict_from_category(batch.images, batch.categories, None, options, rng)
            }
            GenerationMode::FromAnswer => self.model.predict_from_answer(
                batch.images,
                batch.answers,
                batch.answer_lengths,
                None,
                options,
                rng,
            ),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::IqBatcher;
    use crate::data::dataset::IqSample;
    use crate::ml::model::tests::tiny_config;
    use crate::ml::TestBackend;
    use burn::data::dataloader::batcher::Batcher;
    use rand::{rngs::StdRng, SeedableRng};

    fn sample(category: usize) -> IqSample {
        IqSample {
            image:           vec![0.1; 3 * 16 * 16],
            question:        vec![1, 4, 5, 2, 0],
            question_length: 4,
            answer:          vec![9, 2, 0, 0, 0],
            answer_length:   2,
            category,
        }
    }

    fn inferencer() -> Inferencer<TestBackend> {
        let device = Default::default();
        let cfg = tiny_config();
        Inferencer::new(cfg.init(&device), cfg)
    }

    fn batch(categories: &[usize]) -> IqBatch<TestBackend> {
        IqBatcher::<TestBackend>::new(Default::default(), 16)
            .batch(categories.iter().map(|&c| sample(c)).collect())
    }

    #[test]
    fn test_predict_both_modes() {
        let inf = inferencer();
        for mode in [GenerationMode::FromCategory, GenerationMode::FromAnswer] {
            let tokens = inf
                .predict(batch(&[0, 3]), mode, DecodeOptions::default(), &mut StdRng::seed_from_u64(0))
                .unwrap();
            assert_eq!(tokens.dims(), [2, 5]);
        }
    }

    #[test]
    fn test_out_of_range_category_is_rejected() {
        let inf = inferencer();
        let err = inf
            .predict(batch(&[1, 4]), GenerationMode::FromCategory, DecodeOptions::default(), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<IqError>(), Some(IqError::MalformedBatch(m)) if m.contains("category id 4")));
    }

    #[test]
    fn test_mismatched_batch_sizes_are_rejected() {
        let inf = inferencer();
        let mut b = batch(&[0, 1]);
        b.answer_lengths = Tensor::from_ints([2], &Default::default());
        let err = inf.validate(&b).unwrap_err();
        assert!(err.to_string().contains("answer_lengths"));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let inf = inferencer();
        let err = inf.validate(&batch(&[])).unwrap_err();
        assert!(matches!(err.downcast_ref::<IqError>(), Some(IqError::MalformedBatch(_))));
    }

    #[test]
    fn test_early_stop_override() {
        let inf = inferencer().with_early_stop(true);
        assert!(inf.config().early_stop);
        assert!(inf.model().decoder.early_stop);
    }

    #[test]
    fn test_from_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("iq"));
        let cfg = tiny_config();
        let model: IqModel<TestBackend> = cfg.init(&Default::default());
        ckpt.save_config(&cfg).unwrap();
        ckpt.save_model(&model).unwrap();

        let inf = Inferencer::<TestBackend>::from_checkpoint(&ckpt, &Default::default()).unwrap();
        assert_eq!(inf.config().max_len, 5);
        assert_eq!(inf.model().max_len(), 5);
    }
}
