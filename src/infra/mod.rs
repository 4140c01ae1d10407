// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several layers:
//
//   checkpoint.rs   — CompactRecorder weights + model_config.json
//                     sidecar, with architecture mismatch checks
//
//   vocab_store.rs  — word ↔ id vocabulary on top of a WordLevel
//                     tokenizer
//
//   nlg_eval.rs     — corpus BLEU, METEOR, ROUGE-L, CIDEr-D and
//                     distinct-n
//
//   results.rs      — results / predictions / references JSON files
//
//   logging.rs      — tracing subscriber (stdout + eval.log)
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary loading and token ↔ word conversion
pub mod vocab_store;

/// Text generation metrics
pub mod nlg_eval;

/// Evaluation output files
pub mod results;

/// Subscriber setup
pub mod logging;
