// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits describing a cross-validated
// training run. No Burn types and no file I/O live here.
//
//   error.rs      — TrainError taxonomy
//   options.rs    — loss / prediction / optimizer / scheduler /
//                   device / dataset kinds
//   sample.rs     — SampleSet and FoldSplit
//   fold_state.rs — epoch log rows, best snapshots, FoldState
//   summary.rs    — per-criterion run summary tables
//   traits.rs     — ArtifactStore and FoldSession seams

pub mod error;

pub mod options;

pub mod sample;

pub mod fold_state;

pub mod summary;

pub mod traits;
