// ============================================================
// Layer 3 — Fold State
// ============================================================
// Everything one fold remembers while it trains:
//
//   - the epoch log (one EpochRow per finished epoch)
//   - the primary best snapshot   (highest validation score)
//   - the secondary best snapshot (highest validation accuracy)
//
// The two snapshots are separate records with separate update
// rules. Each rule reads and writes only its own record, so the
// trackers can disagree about which epoch was best.
//
// Epochs are numbered from 1. A snapshot with epoch 0 has never
// been replaced.

use serde::{Deserialize, Serialize};

use crate::domain::error::TrainError;

/// Which "best model" rule a snapshot or summary table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionCriterion {
    /// Highest validation ranking score (quadratic weighted kappa)
    Score,
    /// Highest validation accuracy
    Accuracy,
}

impl SelectionCriterion {
    pub fn label(self) -> &'static str {
        match self {
            Self::Score    => "score",
            Self::Accuracy => "accuracy",
        }
    }
}

/// Batch-weighted averages of one pass over a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub loss:     f64,
    pub score:    f64,
    pub ac_score: f64,
    pub f1_score: f64,
}

/// One line of a fold's log file.
/// Field names are the CSV column names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRow {
    pub epoch:        usize,
    pub loss:         f64,
    pub score:        f64,
    pub ac_score:     f64,
    pub f1_score:     f64,
    pub val_loss:     f64,
    pub val_score:    f64,
    pub val_ac_score: f64,
    pub val_f1_score: f64,
}

impl EpochRow {
    pub const COLUMNS: [&'static str; 9] = [
        "epoch", "loss", "score", "ac_score", "f1_score",
        "val_loss", "val_score", "val_ac_score", "val_f1_score",
    ];

    pub fn new(epoch: usize, train: &PhaseMetrics, valid: &PhaseMetrics) -> Self {
        Self {
            epoch,
            loss:         train.loss,
            score:        train.score,
            ac_score:     train.ac_score,
            f1_score:     train.f1_score,
            val_loss:     valid.loss,
            val_score:    valid.score,
            val_ac_score: valid.ac_score,
            val_f1_score: valid.f1_score,
        }
    }
}

/// Validation figures of the epoch a tracker last picked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestSnapshot {
    pub loss:     f64,
    pub score:    f64,
    pub ac_score: f64,
    pub f1_score: f64,
    pub epoch:    usize,
}

impl BestSnapshot {
    /// Worst possible values: any real epoch beats them.
    pub fn worst() -> Self {
        Self { loss: f64::INFINITY, score: 0.0, ac_score: 0.0, f1_score: 0.0, epoch: 0 }
    }

    pub fn from_row(row: &EpochRow) -> Self {
        Self {
            loss:     row.val_loss,
            score:    row.val_score,
            ac_score: row.val_ac_score,
            f1_score: row.val_f1_score,
            epoch:    row.epoch,
        }
    }
}

impl Default for BestSnapshot {
    fn default() -> Self {
        Self::worst()
    }
}

/// Lifecycle of a fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldPhase {
    Pending,
    SkippedResume,
    Training,
    Done,
}

/// Which trackers moved when an epoch was recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochVerdict {
    pub primary_improved:   bool,
    pub secondary_improved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldState {
    fold:      usize,
    phase:     FoldPhase,
    primary:   BestSnapshot,
    secondary: BestSnapshot,
    log:       Vec<EpochRow>,
}

impl FoldState {
    pub fn new(fold: usize) -> Self {
        Self {
            fold,
            phase:     FoldPhase::Pending,
            primary:   BestSnapshot::worst(),
            secondary: BestSnapshot::worst(),
            log:       Vec::new(),
        }
    }

    /// Rebuild the terminal state of a fold from its persisted log.
    ///
    /// Primary snapshot: the row with the lowest validation loss.
    /// Secondary snapshot: the row with the highest validation accuracy.
    /// Ties go to the earliest row.
    pub fn from_log(fold: usize, rows: Vec<EpochRow>) -> Result<Self, TrainError> {
        let by_loss = rows
            .iter()
            .fold(None::<&EpochRow>, |best, row| match best {
                Some(b) if b.val_loss <= row.val_loss => Some(b),
                _ => Some(row),
            })
            .ok_or_else(|| TrainError::resume(fold, "log has no epoch rows"))?;

        let by_accuracy = rows
            .iter()
            .fold(None::<&EpochRow>, |best, row| match best {
                Some(b) if b.val_ac_score >= row.val_ac_score => Some(b),
                _ => Some(row),
            })
            .ok_or_else(|| TrainError::resume(fold, "log has no epoch rows"))?;

        let primary   = BestSnapshot::from_row(by_loss);
        let secondary = BestSnapshot::from_row(by_accuracy);

        Ok(Self { fold, phase: FoldPhase::SkippedResume, primary, secondary, log: rows })
    }

    pub fn begin_training(&mut self) {
        self.phase = FoldPhase::Training;
    }

    /// Append an epoch and apply both best-model rules.
    ///
    /// Rule A: strictly higher `val_score` than the primary best
    /// replaces the primary snapshot.
    /// Rule B: strictly higher `val_ac_score` than the secondary best
    /// replaces the secondary snapshot.
    pub fn record(&mut self, row: EpochRow) -> EpochVerdict {
        let mut verdict = EpochVerdict::default();

        if row.val_score > self.primary.score {
            self.primary = BestSnapshot::from_row(&row);
            verdict.primary_improved = true;
        }
        if row.val_ac_score > self.secondary.ac_score {
            self.secondary = BestSnapshot::from_row(&row);
            verdict.secondary_improved = true;
        }

        self.log.push(row);
        verdict
    }

    pub fn finish(&mut self) {
        self.phase = FoldPhase::Done;
    }

    pub fn phase(&self) -> FoldPhase {
        self.phase
    }

    pub fn primary(&self) -> &BestSnapshot {
        &self.primary
    }

    pub fn secondary(&self) -> &BestSnapshot {
        &self.secondary
    }

    pub fn log(&self) -> &[EpochRow] {
        &self.log
    }

    pub fn outcome(&self) -> FoldOutcome {
        FoldOutcome {
            fold:      self.fold,
            resumed:   self.phase == FoldPhase::SkippedResume,
            primary:   self.primary,
            secondary: self.secondary,
        }
    }
}

/// What a finished fold hands back to the run orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldOutcome {
    pub fold:      usize,
    pub resumed:   bool,
    pub primary:   BestSnapshot,
    pub secondary: BestSnapshot,
}

impl FoldOutcome {
    pub fn snapshot(&self, criterion: SelectionCriterion) -> &BestSnapshot {
        match criterion {
            SelectionCriterion::Score    => &self.primary,
            SelectionCriterion::Accuracy => &self.secondary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(epoch: usize, val_loss: f64, val_score: f64, val_ac: f64) -> EpochRow {
        let train = PhaseMetrics { loss: 1.0, score: 0.5, ac_score: 0.5, f1_score: 0.5 };
        let valid = PhaseMetrics { loss: val_loss, score: val_score, ac_score: val_ac, f1_score: 0.4 };
        EpochRow::new(epoch, &train, &valid)
    }

    #[test]
    fn test_trackers_are_independent() {
        let mut state = FoldState::new(1);
        state.begin_training();

        // epoch 1: best score, epoch 2: best accuracy
        state.record(row(1, 0.9, 0.80, 0.60));
        state.record(row(2, 0.8, 0.70, 0.75));
        state.record(row(3, 0.7, 0.65, 0.70));

        assert_eq!(state.primary().epoch, 1);
        assert_eq!(state.secondary().epoch, 2);
        assert_eq!(state.primary().score, 0.80);
        assert_eq!(state.secondary().ac_score, 0.75);
        assert_eq!(state.log().len(), 3);
    }

    #[test]
    fn test_ties_do_not_replace_snapshot() {
        let mut state = FoldState::new(1);
        let v1 = state.record(row(1, 0.5, 0.6, 0.6));
        let v2 = state.record(row(2, 0.4, 0.6, 0.6));
        assert!(v1.primary_improved && v1.secondary_improved);
        assert!(!v2.primary_improved && !v2.secondary_improved);
        assert_eq!(state.primary().epoch, 1);
    }

    #[test]
    fn test_zero_score_never_becomes_best() {
        let mut state = FoldState::new(1);
        state.record(row(1, 0.5, 0.0, 0.0));
        assert_eq!(*state.primary(), BestSnapshot::worst());
        assert_eq!(state.secondary().epoch, 0);
    }

    #[test]
    fn test_from_log_picks_min_loss_and_max_accuracy() {
        let rows = vec![
            row(1, 0.9, 0.70, 0.60),
            row(2, 0.4, 0.60, 0.65),
            row(3, 0.4, 0.90, 0.80),
        ];
        let state = FoldState::from_log(2, rows).unwrap();
        assert_eq!(state.phase(), FoldPhase::SkippedResume);
        assert_eq!(state.primary().epoch, 2);
        assert_eq!(state.primary().loss, 0.4);
        assert_eq!(state.secondary().epoch, 3);
        assert!(state.outcome().resumed);
    }

    #[test]
    fn test_from_empty_log_is_resume_mismatch() {
        let err = FoldState::from_log(4, Vec::new()).unwrap_err();
        assert!(matches!(err, TrainError::ResumeMismatch { fold: 4, .. }));
    }
}
