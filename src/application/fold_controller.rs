// ============================================================
// Layer 2 — Fold Controller
// ============================================================
// Drives one fold from Pending to Done.
//
//   Pending ──(marker present)──▶ SkippedResume ──▶ outcome from the log
//      │
//      └─(no marker)──▶ Training ──▶ epochs 1..=N ──▶ Done
//
// Per epoch, in this order:
//   train pass → validation pass → schedule step
//   → append the row and rewrite the whole log
//   → rule A: new best score?     keep weights, store the matrix
//   → rule B: new best accuracy?  keep weights
//
// After the last epoch the session saves the kept weights and
// only then is the completion marker written. Any error aborts
// the fold; rows already logged stay on disk.

use anyhow::Result;

use crate::domain::fold_state::{EpochRow, FoldOutcome, FoldState, SelectionCriterion};
use crate::domain::traits::{ArtifactStore, FoldSession};

pub struct FoldController<'a, S: ArtifactStore + ?Sized> {
    store:  &'a S,
    epochs: usize,
}

impl<'a, S: ArtifactStore + ?Sized> FoldController<'a, S> {
    pub fn new(store: &'a S, epochs: usize) -> Self {
        Self { store, epochs }
    }

    /// Run or resume fold `fold`. `open_session` is called only when
    /// the fold actually trains.
    pub fn run<'s, F>(&self, fold: usize, open_session: F) -> Result<FoldOutcome>
    where
        F: FnOnce() -> Result<Box<dyn FoldSession + 's>>,
    {
        if self.store.is_fold_complete(fold)? {
            let state = FoldState::from_log(fold, self.store.read_log(fold)?)?;
            let best  = state.primary();
            tracing::info!(
                "Fold {fold} already complete: val_loss={:.4} val_score={:.4} at epoch {}",
                best.loss, best.score, best.epoch
            );
            return Ok(state.outcome());
        }

        let mut session = open_session()?;
        let mut state   = FoldState::new(fold);
        state.begin_training();

        for epoch in 1..=self.epochs {
            let train = session.train_epoch(epoch)?;
            let valid = session.validate_epoch(epoch)?;
            let next_lr = session.advance_schedule(valid.metrics.loss);

            let verdict = state.record(EpochRow::new(epoch, &train, &valid.metrics));
            self.store.write_log(fold, state.log())?;

            if verdict.primary_improved {
                if let Some(aux) = &valid.aux {
                    self.store.write_aux(fold, aux)?;
                }
                session.snapshot_best(SelectionCriterion::Score);
                tracing::info!("Fold {fold} epoch {epoch}: best val_score {:.4}", valid.metrics.score);
            }
            if verdict.secondary_improved {
                session.snapshot_best(SelectionCriterion::Accuracy);
                tracing::info!("Fold {fold} epoch {epoch}: best val_ac_score {:.4}", valid.metrics.ac_score);
            }
            tracing::debug!("Fold {fold} epoch {epoch}: next lr {next_lr:.3e}");
        }

        session.finish(fold)?;
        self.store.mark_fold_complete(fold)?;
        state.finish();
        Ok(state.outcome())
    }
}

// ─── Scripted sessions for orchestration tests ───────────────────────────────
#[cfg(test)]
pub mod fake {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::{bail, Result};
    use ndarray::Array2;

    use crate::domain::fold_state::{PhaseMetrics, SelectionCriterion};
    use crate::domain::traits::{FoldSession, ValidationOutcome};

    /// What a scripted session was asked to do, in order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Train(usize),
        Validate(usize),
        Schedule,
        Snapshot(SelectionCriterion, usize),
        Finish(usize),
    }

    /// Replays one `(val_loss, val_score, val_ac_score)` triple per epoch.
    pub struct ScriptedSession {
        pub script:  Vec<(f64, f64, f64)>,
        pub fail_at: Option<usize>,
        pub calls:   Rc<RefCell<Vec<Call>>>,
        epoch:       usize,
    }

    impl ScriptedSession {
        pub fn new(script: Vec<(f64, f64, f64)>, calls: Rc<RefCell<Vec<Call>>>) -> Self {
            Self { script, fail_at: None, calls, epoch: 0 }
        }
    }

    impl FoldSession for ScriptedSession {
        fn train_epoch(&mut self, epoch: usize) -> Result<PhaseMetrics> {
            if self.fail_at == Some(epoch) {
                bail!("device lost at epoch {epoch}");
            }
            self.epoch = epoch;
            self.calls.borrow_mut().push(Call::Train(epoch));
            Ok(PhaseMetrics { loss: 1.0, score: 0.3, ac_score: 0.4, f1_score: 0.2 })
        }

        fn validate_epoch(&mut self, epoch: usize) -> Result<ValidationOutcome> {
            self.calls.borrow_mut().push(Call::Validate(epoch));
            let (loss, score, ac) = self.script[epoch - 1];
            Ok(ValidationOutcome {
                metrics: PhaseMetrics { loss, score, ac_score: ac, f1_score: 0.1 },
                aux:     Some(Array2::from_elem((2, 2), epoch as f32)),
            })
        }

        fn advance_schedule(&mut self, _val_loss: f64) -> f64 {
            self.calls.borrow_mut().push(Call::Schedule);
            1e-3
        }

        fn snapshot_best(&mut self, criterion: SelectionCriterion) {
            self.calls.borrow_mut().push(Call::Snapshot(criterion, self.epoch));
        }

        fn finish(&mut self, fold: usize) -> Result<()> {
            self.calls.borrow_mut().push(Call::Finish(fold));
            Ok(())
        }
    }
}
