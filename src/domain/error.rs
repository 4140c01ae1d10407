// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Failures with a name. Everything else travels as anyhow::Error
// with context attached at the I/O boundary; these variants are
// for conditions callers may want to match on in tests.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IqError {
    /// The sidecar config describes a different architecture than
    /// the one the weights were saved from.
    #[error("model config mismatch: {0}")]
    ConfigMismatch(String),

    /// Hyperparameters no model can be built or run with.
    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    /// A batch whose tensors do not have the shapes the model expects.
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    /// Category or answer conditioning was requested from a model built
    /// without the category space.
    #[error("model was built without a category space; category and answer conditioning are unavailable")]
    NoCategorySpace,

    /// The vocabulary file lacks one of the reserved symbols.
    #[error("vocabulary is missing reserved symbol '{0}'")]
    MissingSymbol(String),

    #[error("dataset '{0}' contains no examples")]
    EmptyDataset(String),
}
