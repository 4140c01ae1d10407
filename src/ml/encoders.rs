// ============================================================
// Layer 5 — Encoders
// ============================================================
// ImageEncoder    [batch, 3, H, W]      → [batch, z_img]
// CategoryEncoder [batch] category ids   → [batch, z_category]
// QuestionEncoder [batch, seq] token ids → per-layer final states

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::mlp::{Mlp, MlpConfig};
use crate::ml::recurrent::{RecurrentStack, RecurrentStackConfig, RecurrentState, RnnCell};

/// Width of the category embedding table.
pub const CATEGORY_EMBEDDING_DIM: usize = 8;

const IMAGE_CHANNELS: [usize; 4] = [3, 16, 32, 64];

// ─── ImageEncoder ─────────────────────────────────────────────────────────────
/// Fixed feature extractor: three stride-2 convolutions, global average
/// pooling and a projection to `z_img`.
#[derive(Module, Debug)]
pub struct ImageEncoder<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub pool:  AdaptiveAvgPool2d,
    pub fc:    Linear<B>,
}

impl<B: Backend> ImageEncoder<B> {
    pub fn new(z_img: usize, device: &B::Device) -> Self {
        let convs = IMAGE_CHANNELS
            .windows(2)
            .map(|c| {
                Conv2dConfig::new([c[0], c[1]], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device)
            })
            .collect();
        Self {
            convs,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc:   LinearConfig::new(IMAGE_CHANNELS[3], z_img).init(device),
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, ..] = images.dims();
        let mut x = images;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        let pooled = self.pool.forward(x).reshape([batch, IMAGE_CHANNELS[3]]);
        self.fc.forward(pooled)
    }
}

// ─── CategoryEncoder ──────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct CategoryEncoder<B: Backend> {
    pub embedding: Embedding<B>,
    pub mlp:       Mlp<B>,
}

impl<B: Backend> CategoryEncoder<B> {
    pub fn new(num_categories: usize, z_category: usize, device: &B::Device) -> Self {
        Self {
            embedding: EmbeddingConfig::new(num_categories, CATEGORY_EMBEDDING_DIM).init(device),
            mlp: MlpConfig::new(CATEGORY_EMBEDDING_DIM, CATEGORY_EMBEDDING_DIM, z_category)
                .with_num_layers(2)
                .init(device),
        }
    }

    pub fn forward(&self, categories: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let [batch] = categories.dims();
        let embedded = self
            .embedding
            .forward(categories.reshape([batch, 1]))
            .reshape([batch, CATEGORY_EMBEDDING_DIM]);
        self.mlp.forward(embedded)
    }

    /// Encode a distribution over categories ([batch, num_categories])
    /// as the probability-weighted mix of category embeddings.
    pub fn forward_soft(&self, probs: Tensor<B, 2>) -> Tensor<B, 2> {
        let mixed = probs.matmul(self.embedding.weight.val());
        self.mlp.forward(mixed)
    }
}

// ─── QuestionEncoder ──────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct QuestionEncoder<B: Backend> {
    pub embedding:     Embedding<B>,
    pub input_dropout: Dropout,
    pub rnn:           RecurrentStack<B>,
}

impl<B: Backend> QuestionEncoder<B> {
    pub fn new(
        vocab_size:      usize,
        hidden_size:     usize,
        num_layers:      usize,
        cell:            RnnCell,
        input_dropout_p: f64,
        dropout_p:       f64,
        device:          &B::Device,
    ) -> Self {
        Self {
            embedding:     EmbeddingConfig::new(vocab_size, hidden_size).init(device),
            input_dropout: DropoutConfig::new(input_dropout_p).init(),
            rnn: RecurrentStackConfig::new(hidden_size, hidden_size, num_layers, cell)
                .with_dropout(dropout_p)
                .init(device),
        }
    }

    /// tokens: [batch, seq], lengths: [batch] → final state of every layer.
    ///
    /// An example's state stops changing once `t >= length`, so the
    /// result is the state after its last real token.
    pub fn forward(
        &self,
        tokens:  Tensor<B, 2, Int>,
        lengths: Tensor<B, 1, Int>,
    ) -> Vec<RecurrentState<B>> {
        let [batch, seq] = tokens.dims();
        let device = tokens.device();
        let embedded = self.input_dropout.forward(self.embedding.forward(tokens));
        let [_, _, d_embed] = embedded.dims();

        let mut states = self.rnn.zero_states(batch, &device);
        for t in 0..seq {
            let x = embedded
                .clone()
                .slice([0..batch, t..t + 1, 0..d_embed])
                .reshape([batch, d_embed]);
            let (_, next) = self.rnn.step(x, states.clone());

            // 1.0 while t < length, else 0.0; broadcast over the hidden dim
            let active = lengths
                .clone()
                .greater_elem(t as i64)
                .float()
                .reshape([batch, 1]);

            states = states
                .into_iter()
                .zip(next)
                .map(|(old, new)| {
                    let active = active.clone();
                    old.zip_with(new, move |o, n| o.clone() + (n - o) * active.clone())
                })
                .collect();
        }
        states
    }

    /// The hidden component of the last layer, [batch, hidden].
    pub fn final_hidden(&self, tokens: Tensor<B, 2, Int>, lengths: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let [batch, _] = tokens.dims();
        let device = tokens.device();
        self.forward(tokens, lengths)
            .last()
            .map(RecurrentState::hidden)
            .unwrap_or_else(|| Tensor::zeros([batch, self.rnn.d_hidden], &device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::TestBackend;

    #[test]
    fn test_image_encoder_shape() {
        let device = Default::default();
        let enc = ImageEncoder::<TestBackend>::new(12, &device);
        let out = enc.forward(Tensor::zeros([2, 3, 16, 16], &device));
        assert_eq!(out.dims(), [2, 12]);
    }

    #[test]
    fn test_category_encoder_hard_and_soft_agree_on_one_hot() {
        let device = Default::default();
        let enc = CategoryEncoder::<TestBackend>::new(4, 5, &device);
        let hard = enc.forward(Tensor::from_ints([2, 0], &device));
        let one_hot = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0, 1.0, 0.0], [1.0, 0.0, 0.0, 0.0]],
            &device,
        );
        let soft = enc.forward_soft(one_hot);
        assert_eq!(hard.dims(), [2, 5]);
        let diff = (hard - soft).abs().max().into_scalar();
        assert!(diff < 1e-5);
    }

    #[test]
    fn test_question_encoder_ignores_padding() {
        let device = Default::default();
        for cell in [RnnCell::Lstm, RnnCell::Gru] {
            let enc = QuestionEncoder::<TestBackend>::new(10, 6, 2, cell, 0.0, 0.0, &device);
            // Same three real tokens, different padding tails.
            let a = Tensor::<TestBackend, 2, Int>::from_ints([[4, 5, 6, 0, 0]], &device);
            let b = Tensor::<TestBackend, 2, Int>::from_ints([[4, 5, 6, 9, 7]], &device);
            let len = Tensor::<TestBackend, 1, Int>::from_ints([3], &device);
            let ha = enc.final_hidden(a, len.clone());
            let hb = enc.final_hidden(b, len);
            assert_eq!(ha.dims(), [1, 6]);
            let diff = (ha - hb).abs().max().into_scalar();
            assert!(diff < 1e-6, "{cell:?} state changed after the true length");
        }
    }
}
