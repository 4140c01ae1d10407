// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal each:
//
//   evaluate_use_case.rs — run a checkpoint over a dataset, score
//                          the generated questions, write results
//
//   init_use_case.rs     — write a freshly initialised checkpoint
//                          sized to a vocabulary
//
// Rules for this layer:
//   - No ML math or model code here
//   - Only workflow coordination; the layers below do the work
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The evaluation workflow
pub mod evaluate_use_case;

// Checkpoint initialisation
pub mod init_use_case;
