// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From a dataset JSON file to device-ready tensor batches:
//
//   dataset.json
//       │
//       ▼
//   JsonExampleLoader   → reads records, resolves image paths
//       │
//       ▼
//   Preprocessor        → cleans text, decodes + normalises images
//       │
//       ▼
//   Vocabulary          → question / answer text to padded ids
//       │
//       ▼
//   IqDataset           → implements Burn's Dataset trait
//       │
//       ▼
//   IqBatcher           → stacks samples into tensor batches
//       │
//       ▼
//   DataLoader          → feeds batches to the evaluation loop, in order
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the JSON dataset file
pub mod loader;

/// Text cleaning and image normalisation
pub mod preprocessor;

/// Implements Burn's Dataset trait for IQ samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
