// ============================================================
// Layer 2 — Run Orchestrator
// ============================================================
// Runs the folds of a run in order and keeps the two summary
// tables (best score / best accuracy) on disk.
//
// After every fold, trained or resumed, both tables are written
// again with the new row and a fresh mean row, so a crash after
// fold k leaves folds 1..=k recorded.
//
// Single-fold mode stops after fold 1. Sessions never outlive
// their fold: each one is dropped before the next is opened.

use anyhow::Result;

use crate::application::fold_controller::FoldController;
use crate::domain::fold_state::SelectionCriterion;
use crate::domain::sample::FoldSplit;
use crate::domain::summary::SummaryTable;
use crate::domain::traits::{ArtifactStore, FoldSession};

/// Both summary tables of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub primary:   SummaryTable,
    pub secondary: SummaryTable,
}

pub struct RunOrchestrator<'a, S: ArtifactStore + ?Sized> {
    store:          &'a S,
    epochs:         usize,
    cross_validate: bool,
}

impl<'a, S: ArtifactStore + ?Sized> RunOrchestrator<'a, S> {
    pub fn new(store: &'a S, epochs: usize, cross_validate: bool) -> Self {
        Self { store, epochs, cross_validate }
    }

    /// `open_session(fold, split)` builds the trainable state of a fold;
    /// folds are numbered from 1.
    pub fn run<'s, F>(&self, splits: &[FoldSplit], mut open_session: F) -> Result<RunSummary>
    where
        F: FnMut(usize, &FoldSplit) -> Result<Box<dyn FoldSession + 's>>,
    {
        let mut summary = RunSummary {
            primary:   SummaryTable::new(SelectionCriterion::Score),
            secondary: SummaryTable::new(SelectionCriterion::Accuracy),
        };
        let controller = FoldController::new(self.store, self.epochs);

        for (i, split) in splits.iter().enumerate() {
            let fold = i + 1;
            tracing::info!("Fold {fold}/{}", splits.len());

            let outcome = controller.run(fold, || open_session(fold, split))?;

            summary.primary.push(&outcome);
            summary.secondary.push(&outcome);
            self.store.write_summary(&summary.primary)?;
            self.store.write_summary(&summary.secondary)?;

            if !self.cross_validate {
                tracing::info!("Cross-validation off, stopping after fold {fold}");
                break;
            }
        }
        Ok(summary)
    }
}
