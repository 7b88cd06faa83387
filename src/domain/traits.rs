// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The fold controller and run orchestrator only talk to these
// two seams:
//
//   ArtifactStore → where logs, summaries, correlation matrices
//                   and completion markers live
//                   (RunDirectory on disk, an in-memory store in tests)
//
//   FoldSession   → one fold's model + optimizer + data loaders
//                   (BurnFoldSession for real training, scripted
//                   fakes in tests)
//
// Neither trait mentions tensors, so the orchestration logic
// compiles and tests without a compute backend.

use anyhow::Result;
use ndarray::Array2;

use crate::domain::fold_state::{EpochRow, PhaseMetrics, SelectionCriterion};
use crate::domain::summary::SummaryTable;

/// The model's auxiliary output: the learned label-correlation matrix.
pub type AuxMatrix = Array2<f32>;

// ─── ArtifactStore ────────────────────────────────────────────────────────────
/// Persistent state of a named run.
///
/// Folds are numbered from 1.
pub trait ArtifactStore {
    /// True once a fold has written its completion marker.
    fn is_fold_complete(&self, fold: usize) -> Result<bool>;

    /// Record that a fold finished every epoch and saved its weights.
    fn mark_fold_complete(&self, fold: usize) -> Result<()>;

    /// Read a fold's epoch log back, in epoch order.
    fn read_log(&self, fold: usize) -> Result<Vec<EpochRow>>;

    /// Replace a fold's epoch log with `rows`.
    fn write_log(&self, fold: usize, rows: &[EpochRow]) -> Result<()>;

    /// Store the correlation matrix captured at the primary-best epoch.
    fn write_aux(&self, fold: usize, aux: &AuxMatrix) -> Result<()>;

    /// Replace the summary table of `table.criterion()`.
    fn write_summary(&self, table: &SummaryTable) -> Result<()>;
}

// ─── FoldSession ──────────────────────────────────────────────────────────────
/// Result of one validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub metrics: PhaseMetrics,
    /// Correlation matrix from the last validation batch, if any batch ran
    pub aux:     Option<AuxMatrix>,
}

/// One fold's trainable state, driven epoch by epoch.
pub trait FoldSession {
    /// One optimizing pass over the training loader.
    fn train_epoch(&mut self, epoch: usize) -> Result<PhaseMetrics>;

    /// One gradient-free pass over the validation loader.
    fn validate_epoch(&mut self, epoch: usize) -> Result<ValidationOutcome>;

    /// Advance the learning-rate schedule after an epoch.
    /// Returns the rate the next epoch will use.
    fn advance_schedule(&mut self, val_loss: f64) -> f64;

    /// Keep the current weights as the best under `criterion`.
    fn snapshot_best(&mut self, criterion: SelectionCriterion);

    /// Persist the kept weights. Called once, after the last epoch.
    fn finish(&mut self, fold: usize) -> Result<()>;
}
