// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits describing the question generation
// problem. Nothing in here touches burn, the filesystem or the
// network, so every type is usable from tests without a device.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// One (image, question, answer, category) record from a dataset file
pub mod example;

/// Conditioning modes and the evaluation report
pub mod generation;

/// Named failure cases shared across layers
pub mod error;

/// Core abstractions (traits) that other layers implement
pub mod traits;
