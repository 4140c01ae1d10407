// ============================================================
// Layer 5 — Question Decoder
// ============================================================
// Generates a question one token at a time from an initial
// hidden state of width 2 · hidden_size:
//
//   step 0:  input = <start>
//   step t:  scores_t = decode_fn(W_out · rnn(embed(input_t)))
//            input_{t+1} = questions[:, t+1]      (teacher forcing)
//                        | argmax(scores_t)        (greedy)
//
// Teacher forcing is decided once per step for the whole batch,
// from the caller's RNG, and only when a ratio > 0 and ground-truth
// questions are both present. Otherwise decoding is fully greedy.
//
// With early stopping on, the loop ends once every example has
// produced <end>; the token matrix is padded with <end> so its
// shape is always [batch, max_len].

use anyhow::Result;
use burn::{
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::error::IqError;
use crate::ml::host_ints;
use crate::ml::recurrent::{RecurrentStack, RecurrentStackConfig, RnnCell};

// ─── DecodeFunction ───────────────────────────────────────────────────────────
/// Transform applied to each step's logits before they are recorded.
/// It changes the scale of the scores, never their argmax.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFunction {
    #[default]
    LogSoftmax,
    Softmax,
    Identity,
}

impl DecodeFunction {
    /// logits: [batch, vocab] → scores: [batch, vocab]
    pub fn apply<B: Backend>(self, logits: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::LogSoftmax => log_softmax(logits, 1),
            Self::Softmax    => softmax(logits, 1),
            Self::Identity   => logits,
        }
    }
}

impl std::str::FromStr for DecodeFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "log_softmax" => Ok(Self::LogSoftmax),
            "softmax"     => Ok(Self::Softmax),
            "identity"    => Ok(Self::Identity),
            other => Err(format!(
                "unknown decode function '{other}' (expected log_softmax, softmax or identity)"
            )),
        }
    }
}

impl std::fmt::Display for DecodeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LogSoftmax => write!(f, "log_softmax"),
            Self::Softmax    => write!(f, "softmax"),
            Self::Identity   => write!(f, "identity"),
        }
    }
}

// ─── DecoderOutput ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct DecoderOutput<B: Backend> {
    /// One [batch, vocab] score matrix per step actually run. With
    /// early stop this can be shorter than max_len; only `tokens` is
    /// always max_len wide.
    pub step_scores: Vec<Tensor<B, 2>>,
    /// [batch, max_len], padded with <end> after an early stop
    pub tokens: Tensor<B, 2, Int>,
    /// Position of the first <end> + 1, or max_len
    pub lengths: Vec<usize>,
}

/// Argmax over the vocabulary at every step, stacked to [batch, steps].
pub fn parse_outputs_to_tokens<B: Backend>(step_scores: &[Tensor<B, 2>]) -> Tensor<B, 2, Int> {
    let symbols = step_scores
        .iter()
        .map(|scores| {
            let [batch, _] = scores.dims();
            scores.clone().argmax(1).reshape([batch])
        })
        .collect();
    Tensor::stack(symbols, 1)
}

/// Generated length of every row: first `eos_id` position + 1, else the width.
pub fn sequence_lengths(tokens: &[i64], width: usize, eos_id: u32) -> Vec<usize> {
    if width == 0 {
        return Vec::new();
    }
    tokens
        .chunks(width)
        .map(|row| {
            row.iter()
                .position(|&t| t == eos_id as i64)
                .map_or(width, |p| p + 1)
        })
        .collect()
}

// ─── QuestionDecoder ──────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct QuestionDecoderConfig {
    pub vocab_size: usize,
    /// Already doubled: 2 · hidden_size
    pub d_hidden:   usize,
    pub num_layers: usize,
    pub cell:       RnnCell,
    pub max_len:    usize,
    pub sos_id:     usize,
    pub eos_id:     usize,
    #[config(default = 0.0)]
    pub input_dropout: f64,
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = false)]
    pub early_stop: bool,
}

impl QuestionDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> QuestionDecoder<B> {
        QuestionDecoder {
            embedding:     EmbeddingConfig::new(self.vocab_size, self.d_hidden).init(device),
            input_dropout: DropoutConfig::new(self.input_dropout).init(),
            rnn: RecurrentStackConfig::new(self.d_hidden, self.d_hidden, self.num_layers, self.cell)
                .with_dropout(self.dropout)
                .init(device),
            out:        LinearConfig::new(self.d_hidden, self.vocab_size).init(device),
            max_len:    self.max_len,
            sos_id:     self.sos_id,
            eos_id:     self.eos_id,
            early_stop: self.early_stop,
        }
    }
}

#[derive(Module, Debug)]
pub struct QuestionDecoder<B: Backend> {
    pub embedding:     Embedding<B>,
    pub input_dropout: Dropout,
    pub rnn:           RecurrentStack<B>,
    pub out:           Linear<B>,
    pub max_len:       usize,
    pub sos_id:        usize,
    pub eos_id:        usize,
    pub early_stop:    bool,
}

impl<B: Backend> QuestionDecoder<B> {
    /// initial: [batch, d_hidden], replicated to every layer.
    /// questions: optional [batch, seq] ground truth starting with <start>.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        initial:               Tensor<B, 2>,
        questions:             Option<Tensor<B, 2, Int>>,
        teacher_forcing_ratio: f64,
        decode_fn:             DecodeFunction,
        rng:                   &mut R,
    ) -> Result<DecoderOutput<B>> {
        if self.max_len == 0 {
            return Err(IqError::InvalidConfig("decoder max_len must be at least 1".to_string()).into());
        }
        let [batch, d_hidden] = initial.dims();
        let device = initial.device();
        let mut states = self.rnn.replicate(initial);

        let forcing_ratio = teacher_forcing_ratio.clamp(0.0, 1.0);
        let question_len = questions.as_ref().map_or(0, |q| q.dims()[1]);

        let mut input = Tensor::<B, 1, Int>::full([batch], self.sos_id as i64, &device);
        let mut step_scores = Vec::with_capacity(self.max_len);
        let mut symbols = Vec::with_capacity(self.max_len);
        let mut finished = vec![false; batch];

        for t in 0..self.max_len {
            let embedded = self
                .input_dropout
                .forward(self.embedding.forward(input.reshape([batch, 1])))
                .reshape([batch, d_hidden]);
            let (top, next) = self.rnn.step(embedded, states);
            states = next;

            let scores = decode_fn.apply(self.out.forward(top));
            let symbol = scores.clone().argmax(1).reshape([batch]);
            step_scores.push(scores);
            symbols.push(symbol.clone());

            if self.early_stop {
                for (done, token) in finished.iter_mut().zip(host_ints(symbol.clone())?) {
                    *done |= token == self.eos_id as i64;
                }
                if finished.iter().all(|&done| done) {
                    tracing::debug!("All {} sequences ended after {} steps", batch, t + 1);
                    break;
                }
            }

            let use_forcing = match &questions {
                Some(_) if forcing_ratio > 0.0 && t + 1 < question_len => rng.gen_bool(forcing_ratio),
                _ => false,
            };
            input = match (&questions, use_forcing) {
                (Some(q), true) => q.clone().slice([0..batch, t + 1..t + 2]).reshape([batch]),
                _ => symbol,
            };
        }

        let steps = symbols.len();
        let mut tokens = Tensor::stack(symbols, 1);
        if steps < self.max_len {
            let padding = Tensor::<B, 2, Int>::full([batch, self.max_len - steps], self.eos_id as i64, &device);
            tokens = Tensor::cat(vec![tokens, padding], 1);
        }

        let lengths = sequence_lengths(&host_ints(tokens.clone())?, self.max_len, self.eos_id as u32);
        Ok(DecoderOutput { step_scores, tokens, lengths })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{host_floats, TestBackend};
    use rand::{rngs::StdRng, SeedableRng};

    fn decoder(cell: RnnCell, early_stop: bool) -> QuestionDecoder<TestBackend> {
        QuestionDecoderConfig::new(10, 8, 2, cell, 5, 1, 2)
            .with_early_stop(early_stop)
            .init(&Default::default())
    }

    #[test]
    fn test_output_is_max_len_for_both_cells() {
        let device = Default::default();
        for cell in [RnnCell::Lstm, RnnCell::Gru] {
            let dec = decoder(cell, false);
            let out = dec
                .forward(Tensor::ones([3, 8], &device), None, 0.0, DecodeFunction::LogSoftmax, &mut StdRng::seed_from_u64(0))
                .unwrap();
            assert_eq!(out.step_scores.len(), 5);
            assert_eq!(out.step_scores[0].dims(), [3, 10]);
            assert_eq!(out.tokens.dims(), [3, 5]);
            assert_eq!(out.lengths.len(), 3);
            assert!(host_ints(out.tokens).unwrap().iter().all(|&t| (0..10).contains(&t)));
        }
    }

    #[test]
    fn test_decode_functions_agree_on_tokens() {
        let device = Default::default();
        let dec = decoder(RnnCell::Lstm, false);
        let init = Tensor::<TestBackend, 2>::random([2, 8], burn::tensor::Distribution::Default, &device);
        let mut tokens = Vec::new();
        for f in [DecodeFunction::LogSoftmax, DecodeFunction::Softmax, DecodeFunction::Identity] {
            let out = dec.forward(init.clone(), None, 0.0, f, &mut StdRng::seed_from_u64(1)).unwrap();
            tokens.push(host_ints(out.tokens).unwrap());
        }
        assert_eq!(tokens[0], tokens[1]);
        assert_eq!(tokens[0], tokens[2]);
    }

    #[test]
    fn test_softmax_scores_sum_to_one() {
        let device = Default::default();
        let dec = decoder(RnnCell::Gru, false);
        let out = dec
            .forward(Tensor::zeros([2, 8], &device), None, 0.0, DecodeFunction::Softmax, &mut StdRng::seed_from_u64(2))
            .unwrap();
        let sums = host_floats(out.step_scores[0].clone().sum_dim(1)).unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_full_teacher_forcing_feeds_ground_truth() {
        let device = Default::default();
        let dec = decoder(RnnCell::Lstm, false);
        let init = Tensor::<TestBackend, 2>::ones([1, 8], &device);
        let gt_a = Tensor::<TestBackend, 2, Int>::from_ints([[1, 4, 5, 6, 2]], &device);
        let gt_b = Tensor::<TestBackend, 2, Int>::from_ints([[1, 9, 9, 9, 2]], &device);

        let a = dec.forward(init.clone(), Some(gt_a.clone()), 1.0, DecodeFunction::Identity, &mut StdRng::seed_from_u64(5)).unwrap();
        let a2 = dec.forward(init.clone(), Some(gt_a), 1.0, DecodeFunction::Identity, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = dec.forward(init, Some(gt_b), 1.0, DecodeFunction::Identity, &mut StdRng::seed_from_u64(5)).unwrap();

        // The first step only sees <start>, so it matches regardless of ground truth.
        let first_a = host_floats(a.step_scores[0].clone()).unwrap();
        let first_b = host_floats(b.step_scores[0].clone()).unwrap();
        assert_eq!(first_a, first_b);
        // Ratio 1 ignores the RNG entirely.
        assert_eq!(host_floats(a.step_scores[3].clone()).unwrap(), host_floats(a2.step_scores[3].clone()).unwrap());
        // Later steps follow the fed tokens.
        assert_ne!(host_floats(a.step_scores[1].clone()).unwrap(), host_floats(b.step_scores[1].clone()).unwrap());
    }

    #[test]
    fn test_early_stop_pads_with_end() {
        let device = Default::default();
        let mut dec = decoder(RnnCell::Gru, true);
        // Force <end> (id 2) at every step: zero weights, bias favouring id 2.
        let mut bias = vec![0.0f32; 10];
        bias[2] = 10.0;
        dec.out.weight = burn::module::Param::from_tensor(Tensor::zeros([8, 10], &device));
        dec.out.bias = Some(burn::module::Param::from_tensor(Tensor::from_floats(bias.as_slice(), &device)));

        let out = dec
            .forward(Tensor::ones([2, 8], &device), None, 0.0, DecodeFunction::LogSoftmax, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(out.step_scores.len(), 1);
        assert_eq!(out.tokens.dims(), [2, 5]);
        assert_eq!(host_ints(out.tokens).unwrap(), vec![2; 10]);
        assert_eq!(out.lengths, vec![1, 1]);
    }

    #[test]
    fn test_zero_max_len_is_an_error() {
        let device = Default::default();
        let dec: QuestionDecoder<TestBackend> =
            QuestionDecoderConfig::new(10, 8, 1, RnnCell::Gru, 0, 1, 2).init(&device);
        let err = dec
            .forward(Tensor::ones([2, 8], &device), None, 0.0, DecodeFunction::LogSoftmax, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<IqError>(), Some(IqError::InvalidConfig(_))));
    }

    #[test]
    fn test_parse_outputs_to_tokens() {
        let device = Default::default();
        let steps = vec![
            Tensor::<TestBackend, 2>::from_floats([[0.1, 0.9, 0.0], [0.7, 0.2, 0.1]], &device),
            Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0, 1.0], [0.3, 0.6, 0.1]], &device),
        ];
        let tokens = parse_outputs_to_tokens(&steps);
        assert_eq!(tokens.dims(), [2, 2]);
        assert_eq!(host_ints(tokens).unwrap(), vec![1, 2, 0, 1]);
    }

    #[test]
    fn test_sequence_lengths() {
        assert_eq!(sequence_lengths(&[4, 2, 0, 5, 6, 7], 3, 2), vec![2, 3]);
        assert!(sequence_lengths(&[], 0, 2).is_empty());
    }

    #[test]
    fn test_decode_function_parsing() {
        assert_eq!("log-softmax".parse::<DecodeFunction>(), Ok(DecodeFunction::LogSoftmax));
        assert_eq!("Identity".parse::<DecodeFunction>(), Ok(DecodeFunction::Identity));
        assert!("argmax".parse::<DecodeFunction>().is_err());
        assert_eq!(DecodeFunction::default().to_string(), "log_softmax");
    }
}
