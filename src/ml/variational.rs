// ============================================================
// Layer 5 — Variational Encoder
// ============================================================
// Fuses image and category features and encodes them into the
// latent space:
//
//   together = [image_features ; category_features]
//   hidden   = fusion_mlp(together)
//   mu       = clamp(W_mu · hidden,     -2,  2)
//   logvar   = clamp(W_logvar · hidden, -20, 20)
//   z        = mu + eps ⊙ exp(0.5 · logvar)
//
// Two noise policies:
//   standard (bayes = false): eps ~ N(0, 1)
//   scaled   (bayes = true):  eps ~ N(0, |1 / alpha|) per dimension,
//                             non-finite scales set to 0, and a 1e-8
//                             offset keeps z away from exact zero
//
// Noise comes from the caller's RNG, so a fixed seed reproduces z.
//
// Reference: Kingma & Welling (2014) reparameterisation trick

use anyhow::Result;
use burn::{
    module::Param,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::Distribution,
};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::ml::host_floats;
use crate::ml::mlp::{Mlp, MlpConfig};

pub const MU_BOUND:     f64 = 2.0;
pub const LOGVAR_BOUND: f64 = 20.0;
pub const Z_EPSILON:    f64 = 1e-8;

/// (mu, logvar, z), all [batch, z_size].
#[derive(Debug, Clone)]
pub struct LatentSample<B: Backend> {
    pub mu:     Tensor<B, 2>,
    pub logvar: Tensor<B, 2>,
    pub z:      Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct VariationalEncoder<B: Backend> {
    pub fusion: Mlp<B>,
    pub mu:     Linear<B>,
    pub logvar: Linear<B>,
    /// Learned per-dimension precision of the scaled-noise policy
    pub alpha:  Param<Tensor<B, 1>>,
    pub bayes:  bool,
}

impl<B: Backend> VariationalEncoder<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        z_img:          usize,
        z_category:     usize,
        att_ff_size:    usize,
        hidden_size:    usize,
        num_att_layers: usize,
        z_size:         usize,
        bayes:          bool,
        device:         &B::Device,
    ) -> Self {
        let fused = (hidden_size / 4).max(1);
        Self {
            fusion: MlpConfig::new(z_img + z_category, (att_ff_size / 4).max(1), fused)
                .with_num_layers(num_att_layers)
                .init(device),
            mu:     LinearConfig::new(fused, z_size).init(device),
            logvar: LinearConfig::new(fused, z_size).init(device),
            alpha:  Param::from_tensor(Tensor::random([z_size], Distribution::Normal(0.0, 1.0), device)),
            bayes,
        }
    }

    /// Fuse the features and project them to clamped (mu, logvar).
    pub fn encode(
        &self,
        image_features:    Tensor<B, 2>,
        category_features: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let together = Tensor::cat(vec![image_features, category_features], 1);
        let hidden = self.fusion.forward(together);
        let mu = self.mu.forward(hidden.clone());
        let logvar = self.logvar.forward(hidden);
        bound_latent(mu, logvar)
    }

    /// Encode and sample in one go.
    pub fn encode_into_t<R: Rng + ?Sized>(
        &self,
        image_features:    Tensor<B, 2>,
        category_features: Tensor<B, 2>,
        rng:               &mut R,
    ) -> Result<LatentSample<B>> {
        let (mu, logvar) = self.encode(image_features, category_features);
        let z = self.reparameterize(mu.clone(), logvar.clone(), rng)?;
        Ok(LatentSample { mu, logvar, z })
    }

    /// Sample z with the policy selected by `bayes`.
    pub fn reparameterize<R: Rng + ?Sized>(
        &self,
        mu:     Tensor<B, 2>,
        logvar: Tensor<B, 2>,
        rng:    &mut R,
    ) -> Result<Tensor<B, 2>> {
        if self.bayes {
            let scale = self.noise_scale()?;
            Ok(sample_latent(mu, logvar, Some(&scale), rng))
        } else {
            Ok(sample_latent(mu, logvar, None, rng))
        }
    }

    /// Per-dimension noise scale |1 / alpha|, with every non-finite entry
    /// (alpha == 0, NaN) replaced by 0.
    pub fn noise_scale(&self) -> Result<Vec<f32>> {
        Ok(reciprocal_scale(&host_floats(self.alpha.val())?))
    }
}

/// Replace NaN by 0, then clamp mu to ±2 and logvar to ±20.
pub fn bound_latent<B: Backend>(mu: Tensor<B, 2>, logvar: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
    (
        zero_nan(mu).clamp(-MU_BOUND, MU_BOUND),
        zero_nan(logvar).clamp(-LOGVAR_BOUND, LOGVAR_BOUND),
    )
}

fn zero_nan<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    // NaN is the only value not equal to itself.
    let nan = x.clone().not_equal(x.clone());
    x.mask_fill(nan, 0.0)
}

/// |1 / a| per entry, 0 wherever that is not finite.
pub fn reciprocal_scale(alpha: &[f32]) -> Vec<f32> {
    alpha
        .iter()
        .map(|a| {
            let d = (1.0 / a).abs();
            if d.is_finite() { d } else { 0.0 }
        })
        .collect()
}

/// z = mu + eps ⊙ exp(0.5 · logvar), with eps drawn from `rng`.
/// When `scale` is given, eps is scaled per latent dimension and the
/// 1e-8 offset is added.
pub fn sample_latent<B: Backend, R: Rng + ?Sized>(
    mu:     Tensor<B, 2>,
    logvar: Tensor<B, 2>,
    scale:  Option<&[f32]>,
    rng:    &mut R,
) -> Tensor<B, 2> {
    let [batch, z_size] = mu.dims();
    let device = mu.device();

    let eps: Vec<f32> = (0..batch * z_size)
        .map(|i| {
            let unit: f32 = rng.sample(StandardNormal);
            match scale {
                Some(s) => unit * s.get(i % z_size).copied().unwrap_or(0.0),
                None    => unit,
            }
        })
        .collect();
    let eps = Tensor::<B, 2>::from_data(TensorData::new(eps, [batch, z_size]), &device);

    let std = logvar.mul_scalar(0.5).exp();
    let z = mu + eps * std;
    match scale {
        Some(_) => z.add_scalar(Z_EPSILON),
        None    => z,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::TestBackend;
    use rand::{rngs::StdRng, SeedableRng};

    fn encoder(bayes: bool) -> VariationalEncoder<TestBackend> {
        VariationalEncoder::new(6, 2, 16, 16, 2, 3, bayes, &Default::default())
    }

    #[test]
    fn test_mu_and_logvar_are_bounded_for_huge_inputs() {
        let device = Default::default();
        let enc = encoder(false);
        for magnitude in [1e3f32, -1e6, 1e9] {
            let img = Tensor::<TestBackend, 2>::full([4, 6], magnitude, &device);
            let cat = Tensor::<TestBackend, 2>::full([4, 2], -magnitude, &device);
            let (mu, logvar) = enc.encode(img, cat);
            for v in host_floats(mu).unwrap() {
                assert!((-2.0..=2.0).contains(&v), "mu = {v}");
            }
            for v in host_floats(logvar).unwrap() {
                assert!((-20.0..=20.0).contains(&v), "logvar = {v}");
            }
        }
    }

    #[test]
    fn test_nan_and_inf_are_bounded() {
        let device = Default::default();
        let mu = Tensor::<TestBackend, 2>::from_floats([[f32::NAN, f32::INFINITY, -3.0]], &device);
        let logvar = Tensor::<TestBackend, 2>::from_floats([[f32::NEG_INFINITY, f32::NAN, 50.0]], &device);
        let (mu, logvar) = bound_latent(mu, logvar);
        assert_eq!(host_floats(mu).unwrap(), vec![0.0, 2.0, -2.0]);
        assert_eq!(host_floats(logvar).unwrap(), vec![-20.0, 0.0, 20.0]);
    }

    #[test]
    fn test_reciprocal_scale_zeroes_division_by_zero() {
        let scale = reciprocal_scale(&[0.0, -0.5, 4.0, f32::NAN]);
        assert_eq!(scale, vec![0.0, 2.0, 0.25, 0.0]);
    }

    #[test]
    fn test_scaled_noise_with_zero_alpha_stays_finite() {
        let device = Default::default();
        let mut enc = encoder(true);
        enc.alpha = Param::from_tensor(Tensor::from_floats([0.0, 1.0, 0.0], &device));
        assert_eq!(enc.noise_scale().unwrap(), vec![0.0, 1.0, 0.0]);

        let mut rng = StdRng::seed_from_u64(7);
        let img = Tensor::<TestBackend, 2>::ones([5, 6], &device);
        let cat = Tensor::<TestBackend, 2>::ones([5, 2], &device);
        let sample = enc.encode_into_t(img, cat, &mut rng).unwrap();

        let z = host_floats(sample.z).unwrap();
        let mu = host_floats(sample.mu).unwrap();
        assert!(z.iter().all(|v| v.is_finite()));
        // Dimensions with a zero scale carry no noise: z = mu + 1e-8.
        for row in 0..5 {
            for dim in [0, 2] {
                let i = row * 3 + dim;
                assert!((z[i] - mu[i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_same_seed_same_sample() {
        let device = Default::default();
        let enc = encoder(false);
        let img = Tensor::<TestBackend, 2>::ones([2, 6], &device);
        let cat = Tensor::<TestBackend, 2>::zeros([2, 2], &device);

        let a = enc.encode_into_t(img.clone(), cat.clone(), &mut StdRng::seed_from_u64(3)).unwrap();
        let b = enc.encode_into_t(img.clone(), cat.clone(), &mut StdRng::seed_from_u64(3)).unwrap();
        let c = enc.encode_into_t(img, cat, &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(host_floats(a.z.clone()).unwrap(), host_floats(b.z).unwrap());
        assert_ne!(host_floats(a.z).unwrap(), host_floats(c.z).unwrap());
    }

    #[test]
    fn test_zero_logvar_standard_noise_is_unit_scale() {
        let device = Default::default();
        let mu = Tensor::<TestBackend, 2>::zeros([2000, 1], &device);
        let logvar = Tensor::<TestBackend, 2>::zeros([2000, 1], &device);
        let z = host_floats(sample_latent(mu, logvar, None, &mut StdRng::seed_from_u64(11))).unwrap();
        let mean = z.iter().sum::<f32>() / z.len() as f32;
        let var = z.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / z.len() as f32;
        assert!(mean.abs() < 0.1);
        assert!((var - 1.0).abs() < 0.15);
    }
}
