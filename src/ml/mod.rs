// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn model and training code.
// Only this layer and the batcher in Layer 4 build tensors.
//
// What's in this layer:
//
//   model.rs     — GcnGrader: stride-2 conv blocks, pooled
//                  features, a linear head, and a learnable
//                  label-correlation matrix mixed back into
//                  the prediction
//
//   criterion.rs — Cross-entropy, focal, MSE and multi-task
//                  losses, each naming the slice metrics use
//
//   scoring.rs   — Quadratic weighted kappa, accuracy, F1
//                  and batch-weighted running means
//
//   schedule.rs  — Cosine and reduce-on-plateau learning rates
//
//   epoch.rs     — One training or evaluation pass
//
//   trainer.rs   — BurnFoldSession: model, optimizer, loaders
//                  and kept weights of one fold
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Grader architecture and backbone names
pub mod model;

/// Loss functions
pub mod criterion;

/// Metric formulas and running means
pub mod scoring;

/// Epoch-level learning-rate schedules
pub mod schedule;

/// Training and evaluation passes
pub mod epoch;

/// Per-fold training session
pub mod trainer;
