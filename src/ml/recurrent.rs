// ============================================================
// Layer 5 — Recurrent Stack
// ============================================================
// A stack of LSTM or GRU layers advanced one timestep at a time.
//
// Stepping manually (instead of running a whole sequence through
// burn's Lstm in one call) gives us two things:
//   - the encoder can freeze an example's state once its true
//     length is reached, which ignores padding exactly like a
//     packed sequence would
//   - the decoder can choose its next input after every step
//
// LSTMs carry a (hidden, cell) pair, GRUs a single hidden tensor.
// RecurrentState models that as an enum so code that transforms
// the state never has to ask which cell produced it.
//
// Reference: Hochreiter & Schmidhuber (1997) LSTM
//            Cho et al. (2014) GRU

use burn::{
    nn::{
        gru::{Gru, GruConfig},
        Dropout, DropoutConfig, Lstm, LstmConfig, LstmState,
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};

/// Which recurrent cell a stack is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RnnCell {
    Lstm,
    Gru,
}

impl std::str::FromStr for RnnCell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LSTM" => Ok(Self::Lstm),
            "GRU"  => Ok(Self::Gru),
            other  => Err(format!("unsupported rnn cell '{other}' (expected LSTM or GRU)")),
        }
    }
}

// ─── RecurrentState ───────────────────────────────────────────────────────────
/// The state of one recurrent layer, shape [batch, d_hidden] per tensor.
#[derive(Debug, Clone)]
pub enum RecurrentState<B: Backend> {
    /// GRU / vanilla RNN
    Single(Tensor<B, 2>),
    /// LSTM
    Paired { hidden: Tensor<B, 2>, cell: Tensor<B, 2> },
}

impl<B: Backend> RecurrentState<B> {
    /// Build the initial state of a `cell` layer from one tensor.
    /// Paired states use it for both the hidden and cell parts.
    pub fn from_hidden(cell_kind: RnnCell, hidden: Tensor<B, 2>) -> Self {
        match cell_kind {
            RnnCell::Lstm => Self::Paired { cell: hidden.clone(), hidden },
            RnnCell::Gru  => Self::Single(hidden),
        }
    }

    /// Combine two states of the same variant tensor by tensor.
    pub fn zip_with(
        self,
        other: Self,
        func:  impl Fn(Tensor<B, 2>, Tensor<B, 2>) -> Tensor<B, 2>,
    ) -> Self {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => Self::Single(func(a, b)),
            (Self::Paired { hidden: ha, cell: ca }, Self::Paired { hidden: hb, cell: cb }) => {
                Self::Paired { hidden: func(ha, hb), cell: func(ca, cb) }
            }
            // Both sides always come from the same stack.
            (a, _) => a,
        }
    }

    /// The hidden component; the cell part of a paired state is dropped.
    pub fn hidden(&self) -> Tensor<B, 2> {
        match self {
            Self::Single(h)             => h.clone(),
            Self::Paired { hidden, .. } => hidden.clone(),
        }
    }
}

// ─── RecurrentStack ───────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct RecurrentStackConfig {
    pub d_input:    usize,
    pub d_hidden:   usize,
    pub num_layers: usize,
    pub cell:       RnnCell,
    #[config(default = 0.0)]
    pub dropout:    f64,
}

impl RecurrentStackConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RecurrentStack<B> {
        let d_in = |layer: usize| if layer == 0 { self.d_input } else { self.d_hidden };
        let layers = self.num_layers.max(1);
        let (lstm, gru) = match self.cell {
            RnnCell::Lstm => (
                (0..layers).map(|l| LstmConfig::new(d_in(l), self.d_hidden, true).init(device)).collect(),
                Vec::new(),
            ),
            RnnCell::Gru => (
                Vec::new(),
                (0..layers).map(|l| GruConfig::new(d_in(l), self.d_hidden, true).init(device)).collect(),
            ),
        };
        RecurrentStack {
            lstm,
            gru,
            dropout:  DropoutConfig::new(self.dropout).init(),
            d_hidden: self.d_hidden,
        }
    }
}

/// Exactly one of `lstm` / `gru` is non-empty.
#[derive(Module, Debug)]
pub struct RecurrentStack<B: Backend> {
    pub lstm:     Vec<Lstm<B>>,
    pub gru:      Vec<Gru<B>>,
    pub dropout:  Dropout,
    pub d_hidden: usize,
}

impl<B: Backend> RecurrentStack<B> {
    pub fn cell(&self) -> RnnCell {
        if self.lstm.is_empty() { RnnCell::Gru } else { RnnCell::Lstm }
    }

    pub fn num_layers(&self) -> usize {
        self.lstm.len().max(self.gru.len())
    }

    /// All-zero states for a batch.
    pub fn zero_states(&self, batch_size: usize, device: &B::Device) -> Vec<RecurrentState<B>> {
        let zeros = Tensor::<B, 2>::zeros([batch_size, self.d_hidden], device);
        self.replicate(zeros)
    }

    /// The same initial state for every layer.
    pub fn replicate(&self, hidden: Tensor<B, 2>) -> Vec<RecurrentState<B>> {
        (0..self.num_layers())
            .map(|_| RecurrentState::from_hidden(self.cell(), hidden.clone()))
            .collect()
    }

    /// Advance every layer by one timestep.
    ///
    /// input: [batch, d_input] → (top-layer output [batch, d_hidden], new states)
    pub fn step(
        &self,
        input:  Tensor<B, 2>,
        states: Vec<RecurrentState<B>>,
    ) -> (Tensor<B, 2>, Vec<RecurrentState<B>>) {
        let mut x = input;
        let mut next = Vec::with_capacity(states.len());
        let layers = self.num_layers();

        for (layer, state) in states.into_iter().enumerate() {
            let [batch, d] = x.dims();
            let step_input = x.reshape([batch, 1, d]);

            let new_state = match (self.cell(), state) {
                (RnnCell::Lstm, RecurrentState::Paired { hidden, cell }) => {
                    let (_, s) = self.lstm[layer].forward(step_input, Some(LstmState::new(cell, hidden)));
                    RecurrentState::Paired { hidden: s.hidden, cell: s.cell }
                }
                (RnnCell::Lstm, RecurrentState::Single(hidden)) => {
                    let (_, s) = self.lstm[layer].forward(step_input, Some(LstmState::new(hidden.clone(), hidden)));
                    RecurrentState::Paired { hidden: s.hidden, cell: s.cell }
                }
                (RnnCell::Gru, state) => {
                    let hidden = state.hidden().reshape([batch, 1, self.d_hidden]);
                    let out = self.gru[layer].forward(step_input, Some(hidden));
                    RecurrentState::Single(out.reshape([batch, self.d_hidden]))
                }
            };

            x = new_state.hidden();
            if layer + 1 < layers {
                x = self.dropout.forward(x);
            }
            next.push(new_state);
        }

        (x, next)
    }
}
