// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles everything a run leaves on disk:
//
//   checkpoint.rs — Model weights and run configuration
//                   Uses Burn's CompactRecorder for the
//                   per-fold best-score / best-accuracy weights,
//                   serde_json for config.json.
//
//   metrics.rs    — CSV epoch logs and summary tables
//
//   run_store.rs  — RunDirectory, the on-disk ArtifactStore:
//                   file names, completion markers, the saved
//                   correlation matrices
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model weight and config persistence
pub mod checkpoint;

/// Epoch log and summary CSV files
pub mod metrics;

/// On-disk artifact store of a named run
pub mod run_store;
