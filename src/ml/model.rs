// ============================================================
// Layer 5 — IQ Model
// ============================================================
// Generates a question from an image and an answer category (or
// the answer itself) through a variational latent space:
//
//   images ──► ImageEncoder ──────────────┐
//                                         ├─► VariationalEncoder ─► z
//   categories ─► CategoryEncoder ────────┘        (mu, logvar)
//   answers ─► QuestionEncoder ─► q_to_c ─► softmax ─► soft CategoryEncoder
//
//   z ─► t_decoder ─► (+ image features) ─► gen_decoder ─► QuestionDecoder
//
// The reconstruction heads map z back to image/category feature
// space. They are optional and decided once, at construction.
//
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize;
// deriving them again gives conflicting impls.

use anyhow::Result;
use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};
use rand::Rng;

use crate::domain::error::IqError;
use crate::ml::decoder::{self, DecodeFunction, DecoderOutput, QuestionDecoder, QuestionDecoderConfig};
use crate::ml::encoders::{CategoryEncoder, ImageEncoder, QuestionEncoder};
use crate::ml::mlp::{Mlp, MlpConfig};
use crate::ml::recurrent::RnnCell;
use crate::ml::variational::{LatentSample, VariationalEncoder};

const CATEGORY_RECON_DROPOUT: f64 = 0.3;

#[derive(Config, Debug)]
pub struct IqConfig {
    pub vocab_size: usize,
    pub sos_id:     usize,
    pub eos_id:     usize,
    #[config(default = 20)]
    pub max_len: usize,
    #[config(default = 512)]
    pub hidden_size: usize,
    #[config(default = 16)]
    pub num_categories: usize,
    #[config(default = 1)]
    pub num_layers: usize,
    #[config(default = "RnnCell::Lstm")]
    pub rnn_cell: RnnCell,
    #[config(default = 0.2)]
    pub input_dropout: f64,
    #[config(default = 0.2)]
    pub dropout: f64,
    #[config(default = 2)]
    pub num_att_layers: usize,
    #[config(default = 512)]
    pub att_ff_size: usize,
    #[config(default = 64)]
    pub z_size: usize,
    #[config(default = 512)]
    pub z_img: usize,
    #[config(default = 8)]
    pub z_category: usize,
    /// Side length images are resized to before encoding
    #[config(default = 224)]
    pub image_size: usize,
    #[config(default = false)]
    pub bayes: bool,
    #[config(default = true)]
    pub image_recon: bool,
    #[config(default = true)]
    pub category_space: bool,
    #[config(default = false)]
    pub early_stop: bool,
}

impl IqConfig {
    /// Reject settings that would build an unusable model.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> anyhow::Error { IqError::InvalidConfig(msg).into() };
        let positive = [
            ("max_len", self.max_len),
            ("hidden_size", self.hidden_size),
            ("num_categories", self.num_categories),
            ("num_layers", self.num_layers),
            ("z_size", self.z_size),
            ("image_size", self.image_size),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(format!("{name} must be at least 1")));
        }
        if self.sos_id >= self.vocab_size || self.eos_id >= self.vocab_size {
            return Err(invalid(format!(
                "<start> ({}) and <end> ({}) must be below vocab_size {}",
                self.sos_id, self.eos_id, self.vocab_size,
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> IqModel<B> {
        let category_encoder = self
            .category_space
            .then(|| CategoryEncoder::new(self.num_categories, self.z_category, device));

        let question_encoder = QuestionEncoder::new(
            self.vocab_size, self.hidden_size, self.num_layers, self.rnn_cell,
            self.input_dropout, self.dropout, device,
        );
        let q_to_c = MlpConfig::new(self.hidden_size, self.num_categories, self.num_categories)
            .with_num_layers(self.num_layers)
            .init(device);

        let variational = VariationalEncoder::new(
            self.z_img, self.z_category, self.att_ff_size, self.hidden_size,
            self.num_att_layers, self.z_size, self.bayes, device,
        );

        let t_decoder   = LinearConfig::new(self.z_size, self.z_img).init(device);
        let gen_decoder = MlpConfig::new(self.z_img, self.att_ff_size, 2 * self.hidden_size).init(device);
        let decoder = QuestionDecoderConfig::new(
            self.vocab_size, 2 * self.hidden_size, self.num_layers, self.rnn_cell,
            self.max_len, self.sos_id, self.eos_id,
        )
        .with_input_dropout(self.input_dropout)
        .with_dropout(self.dropout)
        .with_early_stop(self.early_stop)
        .init(device);

        let image_reconstructor = self.image_recon.then(|| {
            MlpConfig::new(self.z_size, self.att_ff_size, self.z_img)
                .with_num_layers(self.num_att_layers)
                .init(device)
        });
        let category_reconstructor = self.category_space.then(|| {
            MlpConfig::new(self.z_size, (self.att_ff_size / 2).max(1), self.z_category)
                .with_num_layers(self.num_att_layers)
                .with_dropout(CATEGORY_RECON_DROPOUT)
                .init(device)
        });

        IqModel {
            image_encoder: ImageEncoder::new(self.z_img, device),
            category_encoder,
            question_encoder,
            q_to_c,
            variational,
            t_decoder,
            gen_decoder,
            decoder,
            image_reconstructor,
            category_reconstructor,
            num_categories: self.num_categories,
        }
    }
}

#[derive(Module, Debug)]
pub struct IqModel<B: Backend> {
    pub image_encoder:          ImageEncoder<B>,
    pub category_encoder:       Option<CategoryEncoder<B>>,
    pub question_encoder:       QuestionEncoder<B>,
    pub q_to_c:                 Mlp<B>,
    pub variational:            VariationalEncoder<B>,
    pub t_decoder:              Linear<B>,
    pub gen_decoder:            Mlp<B>,
    pub decoder:                QuestionDecoder<B>,
    pub image_reconstructor:    Option<Mlp<B>>,
    pub category_reconstructor: Option<Mlp<B>>,
    pub num_categories:         usize,
}

/// How the decoder turns its hidden state into tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub teacher_forcing_ratio: f64,
    pub decode_fn:             DecodeFunction,
}

impl<B: Backend> IqModel<B> {
    pub fn has_category_space(&self) -> bool {
        self.category_encoder.is_some()
    }

    pub fn max_len(&self) -> usize {
        self.decoder.max_len
    }

    // ─── Encoding ─────────────────────────────────────────────────────────────

    /// [batch, 3, H, W] → [batch, z_img]
    pub fn encode_images(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.image_encoder.forward(images)
    }

    /// [batch] → [batch, z_category]
    pub fn encode_categories(&self, categories: Tensor<B, 1, Int>) -> Result<Tensor<B, 2>> {
        let encoder = self.category_encoder.as_ref().ok_or(IqError::NoCategorySpace)?;
        Ok(encoder.forward(categories))
    }

    /// Last-layer hidden state of the question encoder, [batch, hidden].
    pub fn encode_questions_discriminator(
        &self,
        questions: Tensor<B, 2, Int>,
        lengths:   Tensor<B, 1, Int>,
    ) -> Tensor<B, 2> {
        self.question_encoder.final_hidden(questions, lengths)
    }

    /// Category logits of a token sequence, [batch, num_categories].
    pub fn encode_questions(
        &self,
        questions: Tensor<B, 2, Int>,
        lengths:   Tensor<B, 1, Int>,
    ) -> Tensor<B, 2> {
        self.q_to_c.forward(self.encode_questions_discriminator(questions, lengths))
    }

    /// Answer tokens → category feature, [batch, z_category].
    ///
    /// The answer is classified into the category space and the
    /// resulting distribution selects a mix of category embeddings.
    pub fn encode_answers(
        &self,
        answers: Tensor<B, 2, Int>,
        lengths: Tensor<B, 1, Int>,
    ) -> Result<Tensor<B, 2>> {
        let encoder = self.category_encoder.as_ref().ok_or(IqError::NoCategorySpace)?;
        let probs = softmax(self.encode_questions(answers, lengths), 1);
        Ok(encoder.forward_soft(probs))
    }

    /// Fuse features and sample the latent.
    pub fn encode_into_t<R: Rng + ?Sized>(
        &self,
        image_features:    Tensor<B, 2>,
        category_features: Tensor<B, 2>,
        rng:               &mut R,
    ) -> Result<LatentSample<B>> {
        self.variational.encode_into_t(image_features, category_features, rng)
    }

    /// Images and categories → (image features, latent sample).
    pub fn encode_from_category<R: Rng + ?Sized>(
        &self,
        images:     Tensor<B, 4>,
        categories: Tensor<B, 1, Int>,
        rng:        &mut R,
    ) -> Result<(Tensor<B, 2>, LatentSample<B>)> {
        let image_features = self.encode_images(images);
        let category_features = self.encode_categories(categories)?;
        let latent = self.encode_into_t(image_features.clone(), category_features, rng)?;
        Ok((image_features, latent))
    }

    // ─── Decoding ─────────────────────────────────────────────────────────────

    /// Bridge z (plus image features when given) into the decoder's
    /// initial state, then decode.
    pub fn decode_questions<R: Rng + ?Sized>(
        &self,
        image_features: Option<Tensor<B, 2>>,
        z:              Tensor<B, 2>,
        questions:      Option<Tensor<B, 2, Int>>,
        options:        DecodeOptions,
        rng:            &mut R,
    ) -> Result<DecoderOutput<B>> {
        let t_hidden = self.t_decoder.forward(z);
        let bridged = match image_features {
            Some(features) => features + t_hidden,
            None           => t_hidden,
        };
        let initial = self.gen_decoder.forward(bridged);
        self.decoder.forward(initial, questions, options.teacher_forcing_ratio, options.decode_fn, rng)
    }

    /// Per-step scores → [batch, steps] argmax tokens.
    pub fn parse_outputs_to_tokens(&self, step_scores: &[Tensor<B, 2>]) -> Tensor<B, 2, Int> {
        decoder::parse_outputs_to_tokens(step_scores)
    }

    /// Full pass conditioned on categories: encode, sample, decode.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        images:     Tensor<B, 4>,
        categories: Tensor<B, 1, Int>,
        questions:  Option<Tensor<B, 2, Int>>,
        options:    DecodeOptions,
        rng:        &mut R,
    ) -> Result<DecoderOutput<B>> {
        let (image_features, latent) = self.encode_from_category(images, categories, rng)?;
        self.decode_questions(Some(image_features), latent.z, questions, options, rng)
    }

    /// Token ids [batch, max_len] conditioned on categories.
    pub fn predict_from_category<R: Rng + ?Sized>(
        &self,
        images:     Tensor<B, 4>,
        categories: Tensor<B, 1, Int>,
        questions:  Option<Tensor<B, 2, Int>>,
        options:    DecodeOptions,
        rng:        &mut R,
    ) -> Result<Tensor<B, 2, Int>> {
        Ok(self.forward(images, categories, questions, options, rng)?.tokens)
    }

    /// Token ids [batch, max_len] conditioned on the answers.
    #[allow(clippy::too_many_arguments)]
    pub fn predict_from_answer<R: Rng + ?Sized>(
        &self,
        images:         Tensor<B, 4>,
        answers:        Tensor<B, 2, Int>,
        answer_lengths: Tensor<B, 1, Int>,
        questions:      Option<Tensor<B, 2, Int>>,
        options:        DecodeOptions,
        rng:            &mut R,
    ) -> Result<Tensor<B, 2, Int>> {
        let image_features = self.encode_images(images);
        let answer_features = self.encode_answers(answers, answer_lengths)?;
        let latent = self.encode_into_t(image_features.clone(), answer_features, rng)?;
        let output = self.decode_questions(Some(image_features), latent.z, questions, options, rng)?;
        Ok(output.tokens)
    }

    // ─── Reconstruction ───────────────────────────────────────────────────────

    /// Map a fresh latent sample back to (image features, category features).
    /// Either side is `None` when its head was not built.
    pub fn reconstruct_inputs<R: Rng + ?Sized>(
        &self,
        image_features:    Tensor<B, 2>,
        category_features: Tensor<B, 2>,
        rng:               &mut R,
    ) -> Result<(Option<Tensor<B, 2>>, Option<Tensor<B, 2>>)> {
        let latent = self.encode_into_t(image_features, category_features, rng)?;
        let image = self.image_reconstructor.as_ref().map(|head| head.forward(latent.z.clone()));
        let category = self.category_reconstructor.as_ref().map(|head| head.forward(latent.z));
        Ok((image, category))
    }

    // ─── Parameter groups ─────────────────────────────────────────────────────

    /// Parameters of the answer → category cycle (question encoder + q_to_c).
    pub fn cycle_param_count(&self) -> usize {
        self.question_encoder.num_params() + self.q_to_c.num_params()
    }

    /// Parameters of the fusion, latent projections and reconstruction heads.
    pub fn info_param_count(&self) -> usize {
        let v = &self.variational;
        v.fusion.num_params()
            + v.mu.num_params()
            + v.logvar.num_params()
            + self.image_reconstructor.as_ref().map_or(0, |m| m.num_params())
            + self.category_reconstructor.as_ref().map_or(0, |m| m.num_params())
    }
}
