// ============================================================
// Layer 4 — IQ Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<IqSample> into
// device tensors.
//
//   Input:  N samples, text padded to max_len, images 3 · S · S floats
//   Output: IqBatch
//     images            [N, 3, S, S]
//     questions         [N, max_len]
//     question_lengths  [N]
//     answers           [N, max_len]
//     answer_lengths    [N]
//     categories        [N]
//
// Every field is flattened into one Vec and reshaped, which works
// because all samples were padded to the same widths upstream.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::IqSample;

// ─── IqBatch ──────────────────────────────────────────────────────────────────
/// A batch of samples ready for the model.
/// All tensors have batch_size as their first dimension.
#[derive(Debug, Clone)]
pub struct IqBatch<B: Backend> {
    pub images:           Tensor<B, 4>,
    pub questions:        Tensor<B, 2, Int>,
    pub question_lengths: Tensor<B, 1, Int>,
    pub answers:          Tensor<B, 2, Int>,
    pub answer_lengths:   Tensor<B, 1, Int>,
    pub categories:       Tensor<B, 1, Int>,
}

impl<B: Backend> IqBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.categories.dims()[0]
    }
}

// ─── IqBatcher ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct IqBatcher<B: Backend> {
    pub device:     B::Device,
    pub image_size: usize,
}

impl<B: Backend> IqBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

fn ints<B: Backend>(values: Vec<i32>, device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::<B, 1, Int>::from_ints(values.as_slice(), device)
}

impl<B: Backend> Batcher<IqSample, IqBatch<B>> for IqBatcher<B> {
    fn batch(&self, items: Vec<IqSample>) -> IqBatch<B> {
        let batch_size = items.len();
        let seq_len = items.first().map_or(0, |s| s.question.len());
        let answer_len = items.first().map_or(0, |s| s.answer.len());
        let side = self.image_size;

        let pixels: Vec<f32> = items.iter().flat_map(|s| s.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, side, side]),
            &self.device,
        );

        let flat = |f: fn(&IqSample) -> &[u32]| -> Vec<i32> {
            items.iter().flat_map(|s| f(s).iter().map(|&t| t as i32)).collect()
        };
        let questions = ints::<B>(flat(|s| s.question.as_slice()), &self.device).reshape([batch_size, seq_len]);
        let answers = ints::<B>(flat(|s| s.answer.as_slice()), &self.device).reshape([batch_size, answer_len]);

        let question_lengths = ints(items.iter().map(|s| s.question_length as i32).collect(), &self.device);
        let answer_lengths = ints(items.iter().map(|s| s.answer_length as i32).collect(), &self.device);
        let categories = ints(items.iter().map(|s| s.category as i32).collect(), &self.device);

        IqBatch { images, questions, question_lengths, answers, answer_lengths, categories }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{host_ints, TestBackend};

    fn sample(category: usize, fill: f32) -> IqSample {
        IqSample {
            image:           vec![fill; 3 * 2 * 2],
            question:        vec![1, 4, 2, 0],
            question_length: 3,
            answer:          vec![9, 2, 0, 0],
            answer_length:   2,
            category,
        }
    }

    #[test]
    fn test_batch_shapes_and_values() {
        let batcher = IqBatcher::<TestBackend>::new(Default::default(), 2);
        let batch = batcher.batch(vec![sample(3, 0.5), sample(1, -1.0)]);

        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.questions.dims(), [2, 4]);
        assert_eq!(batch.answers.dims(), [2, 4]);
        assert_eq!(host_ints(batch.categories).unwrap(), vec![3, 1]);
        assert_eq!(host_ints(batch.question_lengths).unwrap(), vec![3, 3]);
        assert_eq!(host_ints(batch.answers).unwrap(), vec![9, 2, 0, 0, 9, 2, 0, 0]);
        assert_eq!(batch.images.slice([1..2, 0..1, 0..1, 0..1]).into_scalar(), -1.0);
    }
}
