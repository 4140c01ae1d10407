// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All burn-specific code lives here. Every module is generic over
// the burn Backend, so the same model runs on the wgpu accelerator
// for evaluation and on the ndarray CPU backend in tests.
//
//   mlp.rs         — Linear/ReLU stacks used for fusion, projection,
//                    the latent bridge and reconstruction heads
//   recurrent.rs   — multi-layer LSTM/GRU stack stepped one token at
//                    a time, with a tagged single/paired state
//   encoders.rs    — image, category and question encoders
//   variational.rs — fusion + (mu, logvar) + reparameterised sample
//   decoder.rs     — autoregressive / teacher-forced question decoder
//   model.rs       — the IQ model tying everything together
//   inferencer.rs  — checkpoint loading and batched prediction
//
// Reference: Burn Book §3 (Building Blocks)
//            Kingma & Welling (2014) Auto-Encoding Variational Bayes

use anyhow::Result;
use burn::prelude::*;

pub mod mlp;
pub mod recurrent;
pub mod encoders;
pub mod variational;
pub mod decoder;
pub mod model;
pub mod inferencer;

/// Copy a float tensor to the host as `f32`.
pub fn host_floats<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

/// Copy an integer tensor to the host as `i64`.
pub fn host_ints<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Result<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

/// Backend used by the unit tests of this layer.
#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray;
