// ============================================================
// Layer 5 — Multi-Layer Perceptron
// ============================================================
// input → Linear → dropout → ReLU → (Linear → dropout → ReLU) × (n-1) → Linear
//
// `num_layers` counts the hidden layers, so num_layers = 1 is the
// classic input → hidden → output network.

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

#[derive(Config, Debug)]
pub struct MlpConfig {
    pub d_input:  usize,
    pub d_hidden: usize,
    pub d_output: usize,
    #[config(default = 1)]
    pub num_layers: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let hidden = (1..self.num_layers.max(1))
            .map(|_| LinearConfig::new(self.d_hidden, self.d_hidden).init(device))
            .collect();
        Mlp {
            input:   LinearConfig::new(self.d_input, self.d_hidden).init(device),
            hidden,
            output:  LinearConfig::new(self.d_hidden, self.d_output).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub input:   Linear<B>,
    pub hidden:  Vec<Linear<B>>,
    pub output:  Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> Mlp<B> {
    /// [batch, d_input] → [batch, d_output]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = relu(self.dropout.forward(self.input.forward(x)));
        for layer in &self.hidden {
            x = relu(self.dropout.forward(layer.forward(x)));
        }
        self.output.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::TestBackend;

    #[test]
    fn test_mlp_shapes() {
        let device = Default::default();
        let mlp: Mlp<TestBackend> = MlpConfig::new(6, 4, 3).with_num_layers(3).init(&device);
        assert_eq!(mlp.hidden.len(), 2);
        let out = mlp.forward(Tensor::ones([5, 6], &device));
        assert_eq!(out.dims(), [5, 3]);
    }
}
