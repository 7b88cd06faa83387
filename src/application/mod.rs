// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a training run.
//
// Rules for this layer:
//   - No tensor code here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - Files are reached only through the ArtifactStore trait
//     or the infra helpers
//   - Only workflow coordination
//
//   train_use_case  → RunConfig, run directory, backend choice
//   orchestrator    → folds in order, summary tables
//   fold_controller → one fold's epoch loop and resume check

// The training workflow
pub mod train_use_case;

// Fold loop and run-level summaries
pub mod orchestrator;

// One fold's lifecycle
pub mod fold_controller;
