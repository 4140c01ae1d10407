// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the IQ model using Burn's CompactRecorder.
//
// A checkpoint is two files in the same directory:
//   1. <name>.mpk           model weights (named MessagePack, half precision)
//   2. model_config.json    the IqConfig the weights were built from
//
// The config is needed first: the model is rebuilt from it and
// the weights are loaded into that skeleton. Loading never falls
// back to partially initialised weights; any mismatch between the
// two files aborts.
//
// Mismatch detection, all before any weight is copied:
//   - the recorder refuses a record it cannot decode
//   - every Vec/Option submodule (layer stacks, optional heads)
//     must have the same length in the record and in the skeleton;
//     burn asserts on Vec length, so this is checked up front
//   - tensor sizes (hidden_size, z_size, ...) show up as a
//     different parameter count after loading
//
// File layout:
//   weights/
//     iq.mpk
//     model_config.json
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::domain::error::IqError;
use crate::ml::model::{IqConfig, IqModel, IqModelRecord};

pub const CONFIG_FILE: &str = "model_config.json";
/// Extension CompactRecorder appends to the stem.
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Length of every Vec / Option submodule, by path. Module and record
/// share field names, so the same expression reads either.
macro_rules! layout {
    ($m:expr) => {
        [
            ("image_encoder.convs", $m.image_encoder.convs.len()),
            ("category_encoder", $m.category_encoder.iter().count()),
            ("category_encoder.mlp.hidden", $m.category_encoder.iter().map(|c| c.mlp.hidden.len()).sum::<usize>()),
            ("question_encoder.rnn.lstm", $m.question_encoder.rnn.lstm.len()),
            ("question_encoder.rnn.gru", $m.question_encoder.rnn.gru.len()),
            ("q_to_c.hidden", $m.q_to_c.hidden.len()),
            ("variational.fusion.hidden", $m.variational.fusion.hidden.len()),
            ("gen_decoder.hidden", $m.gen_decoder.hidden.len()),
            ("decoder.rnn.lstm", $m.decoder.rnn.lstm.len()),
            ("decoder.rnn.gru", $m.decoder.rnn.gru.len()),
            ("image_reconstructor", $m.image_reconstructor.iter().count()),
            ("image_reconstructor.hidden", $m.image_reconstructor.iter().map(|r| r.hidden.len()).sum::<usize>()),
            ("category_reconstructor", $m.category_reconstructor.iter().count()),
            ("category_reconstructor.hidden", $m.category_reconstructor.iter().map(|r| r.hidden.len()).sum::<usize>()),
        ]
    };
}

/// Locates and reads/writes one checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// Directory holding the weights, the sidecar config and run outputs
    dir: PathBuf,
    /// Weights path without the recorder's extension
    stem: PathBuf,
}

impl CheckpointManager {
    /// `model_path` may name the weights file with or without `.mpk`
    /// (`.mpk.gz` is stripped too).
    pub fn new(model_path: impl AsRef<Path>) -> Self {
        let raw = model_path.as_ref().to_string_lossy().into_owned();
        let stem = raw
            .strip_suffix(".mpk.gz")
            .or_else(|| raw.strip_suffix(".mpk"))
            .unwrap_or(&raw)
            .to_string();
        let stem = PathBuf::from(stem);
        let dir = stem
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self { dir, stem }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn weights_path(&self) -> PathBuf {
        self.stem.with_extension(WEIGHTS_EXTENSION)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Write the weights file.
    pub fn save_model<B: Backend>(&self, model: &IqModel<B>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))?;
        CompactRecorder::new()
            .record(model.clone().into_record(), self.stem.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", self.weights_path().display()))?;
        tracing::debug!("Saved weights to '{}'", self.weights_path().display());
        Ok(())
    }

    /// Load the weights into `model`, which must have been built from
    /// the sidecar config.
    pub fn load_model<B: Backend>(&self, model: IqModel<B>, device: &B::Device) -> Result<IqModel<B>> {
        let weights = self.weights_path();
        if !weights.exists() {
            anyhow::bail!("Cannot find weights file '{}'", weights.display());
        }

        let record = CompactRecorder::new()
            .load(self.stem.clone(), device)
            .map_err(|e| IqError::ConfigMismatch(format!("'{}' does not match {}: {e}", weights.display(), CONFIG_FILE)))?;

        check_layout(&model, &record, &weights)?;

        let expected = model.num_params();
        let model = model.load_record(record);
        let loaded = model.num_params();
        if loaded != expected {
            return Err(IqError::ConfigMismatch(format!(
                "{} describes {expected} parameters but '{}' holds {loaded}",
                CONFIG_FILE,
                weights.display(),
            ))
            .into());
        }

        tracing::info!("Loaded {} parameters from '{}'", loaded, weights.display());
        Ok(model)
    }

    /// Write the sidecar config next to the weights.
    pub fn save_config(&self, cfg: &IqConfig) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))?;
        let path = self.config_path();
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    /// Read the sidecar config.
    pub fn load_config(&self) -> Result<IqConfig> {
        let path = self.config_path();
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. It must sit next to the weights file.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed model config '{}'", path.display()))
    }
}

/// Compare the submodule structure of the skeleton and the record.
fn check_layout<B: Backend>(model: &IqModel<B>, record: &IqModelRecord<B>, weights: &Path) -> Result<()> {
    let expected = layout!(model);
    let found = layout!(record);
    for ((path, want), (_, got)) in expected.iter().zip(found.iter()) {
        if want != got {
            return Err(IqError::ConfigMismatch(format!(
                "{CONFIG_FILE} builds {want} × {path} but '{}' holds {got}",
                weights.display(),
            ))
            .into());
        }
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::tests::tiny_config;
    use crate::ml::{host_floats, TestBackend};

    #[test]
    fn test_paths_strip_extension() {
        let m = CheckpointManager::new("weights/iq.mpk");
        assert_eq!(m.dir(), Path::new("weights"));
        assert_eq!(m.weights_path(), PathBuf::from("weights/iq.mpk"));
        assert_eq!(m.config_path(), PathBuf::from("weights/model_config.json"));

        let gz = CheckpointManager::new("weights/iq.mpk.gz");
        assert_eq!(gz.weights_path(), PathBuf::from("weights/iq.mpk"));

        let bare = CheckpointManager::new("iq");
        assert_eq!(bare.dir(), Path::new("."));
        assert_eq!(bare.weights_path(), PathBuf::from("iq.mpk"));
    }

    #[test]
    fn test_config_round_trip_keeps_flags() {
        let dir = tempfile::tempdir().unwrap();
        let m = CheckpointManager::new(dir.path().join("iq"));
        let cfg = tiny_config().with_bayes(true).with_category_space(false);
        m.save_config(&cfg).unwrap();
        let back = m.load_config().unwrap();
        assert_eq!(back.hidden_size, 8);
        assert!(back.bayes);
        assert!(!back.category_space);
        assert_eq!(back.rnn_cell, cfg.rnn_cell);
    }

    #[test]
    fn test_weights_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let m = CheckpointManager::new(dir.path().join("iq.mpk"));
        let device = Default::default();
        let saved: IqModel<TestBackend> = tiny_config().init(&device);
        m.save_model(&saved).unwrap();
        assert!(m.weights_path().exists());

        let fresh: IqModel<TestBackend> = tiny_config().init(&device);
        let loaded = m.load_model(fresh, &device).unwrap();
        let a = host_floats(saved.t_decoder.weight.val()).unwrap();
        let b = host_floats(loaded.t_decoder.weight.val()).unwrap();
        // Half-precision storage: equal up to f16 rounding.
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_missing_layers_are_a_config_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let m = CheckpointManager::new(dir.path().join("iq"));
        let device = Default::default();
        let saved: IqModel<TestBackend> = tiny_config().init(&device);
        m.save_model(&saved).unwrap();

        let deeper: IqModel<TestBackend> = tiny_config().with_num_layers(2).init(&device);
        let err = m.load_model(deeper, &device).unwrap_err();
        assert!(matches!(err.downcast_ref::<IqError>(), Some(IqError::ConfigMismatch(_))));
    }

    #[test]
    fn test_missing_weights_file() {
        let dir = tempfile::tempdir().unwrap();
        let m = CheckpointManager::new(dir.path().join("absent"));
        let model: IqModel<TestBackend> = tiny_config().init(&Default::default());
        let err = m.load_model(model, &Default::default()).unwrap_err();
        assert!(err.to_string().contains("absent.mpk"));
    }

    #[test]
    fn test_recorder_writes_exactly_the_weights_path() {
        let dir = tempfile::tempdir().unwrap();
        let m = CheckpointManager::new(dir.path().join("iq.mpk.gz"));
        let model: IqModel<TestBackend> = tiny_config().init(&Default::default());
        m.save_model(&model).unwrap();

        let mut files: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["iq.mpk".to_string()]);
        assert_eq!(m.weights_path(), dir.path().join("iq.mpk"));
        assert!(m.load_model(model, &Default::default()).is_ok());
    }

    #[test]
    fn test_fewer_layers_are_a_config_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let m = CheckpointManager::new(dir.path().join("iq"));
        let device = Default::default();
        let saved: IqModel<TestBackend> = tiny_config().with_num_layers(2).init(&device);
        m.save_model(&saved).unwrap();

        let shallow: IqModel<TestBackend> = tiny_config().init(&device);
        let err = m.load_model(shallow, &device).unwrap_err();
        match err.downcast_ref::<IqError>() {
            Some(IqError::ConfigMismatch(msg)) => assert!(msg.contains("rnn.lstm")),
            other => panic!("expected a config mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_optional_head_is_a_config_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let m = CheckpointManager::new(dir.path().join("iq"));
        let device = Default::default();
        let saved: IqModel<TestBackend> = tiny_config().init(&device);
        m.save_model(&saved).unwrap();

        let headless: IqModel<TestBackend> = tiny_config().with_image_recon(false).init(&device);
        let err = m.load_model(headless, &device).unwrap_err();
        assert!(matches!(err.downcast_ref::<IqError>(), Some(IqError::ConfigMismatch(msg)) if msg.contains("image_reconstructor")));
    }
}
