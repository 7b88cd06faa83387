// ============================================================
// Layer 5 — Fold Training Session
// ============================================================
// BurnFoldSession is the FoldSession the fold controller drives
// in a real run. It owns, for one fold only:
//
//   - the GcnGrader model (optionally warm-started from a
//     pretrained run's weights for the same fold)
//   - the optimizer (SGD / Adam / AdamW)
//   - the epoch-level learning-rate schedule
//   - a training loader on the autodiff backend and a
//     validation loader on its inner backend
//   - the two kept "best" copies of the model
//
// Everything is dropped when the fold ends, releasing the
// device memory before the next fold builds its model.
//
// Key Burn insight:
//   - Training uses Autodiff<B> for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - the validation batcher must also use B::InnerBackend

use anyhow::Result;
use std::sync::Arc;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{
        decay::WeightDecayConfig,
        momentum::MomentumConfig,
        AdamConfig, AdamWConfig, Optimizer, SgdConfig,
    },
    tensor::backend::{AutodiffBackend, Backend},
};

use crate::application::train_use_case::RunConfig;
use crate::data::augment::ImageTransform;
use crate::data::batcher::{RetinaBatch, RetinaBatcher};
use crate::data::dataset::RetinaDataset;
use crate::domain::fold_state::{PhaseMetrics, SelectionCriterion};
use crate::domain::options::OptimizerKind;
use crate::domain::sample::{FoldSplit, SampleSet};
use crate::domain::traits::{FoldSession, ValidationOutcome};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::criterion::Criterion;
use crate::ml::epoch::{evaluate_epoch, train_epoch};
use crate::ml::model::GcnGrader;
use crate::ml::schedule::LrSchedule;

pub struct BurnFoldSession<B: AutodiffBackend, O> {
    model:         GcnGrader<B>,
    optim:         O,
    schedule:      LrSchedule,
    criterion:     Criterion,
    train_loader:  Arc<dyn DataLoader<RetinaBatch<B>>>,
    valid_loader:  Arc<dyn DataLoader<RetinaBatch<B::InnerBackend>>>,
    train_len:     usize,
    valid_len:     usize,
    best_score:    Option<GcnGrader<B>>,
    best_accuracy: Option<GcnGrader<B>>,
    checkpoints:   CheckpointManager,
    epochs:        usize,
}

/// Build the session of fold `fold` (numbered from 1) on `device`.
pub fn open_fold_session<B: AutodiffBackend>(
    cfg:    &RunConfig,
    fold:   usize,
    split:  &FoldSplit,
    device: &B::Device,
) -> Result<Box<dyn FoldSession>> {
    match cfg.optimizer {
        OptimizerKind::Sgd => {
            let momentum = MomentumConfig::new()
                .with_momentum(cfg.momentum)
                .with_dampening(0.0)
                .with_nesterov(cfg.nesterov);
            let optim = SgdConfig::new()
                .with_momentum(Some(momentum))
                .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
                .init::<B, GcnGrader<B>>();
            build_session(cfg, fold, split, device, optim)
        }
        OptimizerKind::Adam => {
            let optim = AdamConfig::new()
                .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
                .init::<B, GcnGrader<B>>();
            build_session(cfg, fold, split, device, optim)
        }
        OptimizerKind::AdamW => {
            let optim = AdamWConfig::new()
                .with_weight_decay(cfg.weight_decay as f32)
                .init::<B, GcnGrader<B>>();
            build_session(cfg, fold, split, device, optim)
        }
    }
}

fn build_session<B, O>(
    cfg:    &RunConfig,
    fold:   usize,
    split:  &FoldSplit,
    device: &B::Device,
    optim:  O,
) -> Result<Box<dyn FoldSession>>
where
    B: AutodiffBackend,
    O: Optimizer<GcnGrader<B>, B> + 'static,
{
    // ── Model ─────────────────────────────────────────────────────────────────
    let mut model: GcnGrader<B> = cfg.arch.config(cfg.num_outputs(), cfg.dropout).init(device);
    if let Some(name) = &cfg.pretrained {
        let source = CheckpointManager::new(cfg.output_dir.join(name));
        model = source.load_model(model, SelectionCriterion::Score, fold, device)?;
    }
    tracing::info!(
        "Fold {fold}: {} with {} outputs, {} train / {} valid images",
        cfg.arch,
        cfg.num_outputs(),
        split.train.len(),
        split.valid.len()
    );

    // ── Training loader (autodiff backend) ────────────────────────────────────
    let train_loader = train_loader::<B>(cfg, fold, &split.train, device);

    // ── Validation loader (inner backend, no autodiff overhead) ──────────────
    let valid_ds = RetinaDataset::new(split.valid.clone(), ImageTransform::Eval { input_size: cfg.input_size });
    let valid_loader = DataLoaderBuilder::new(RetinaBatcher::<B::InnerBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .build(valid_ds);

    let schedule = LrSchedule::new(cfg.scheduler, cfg.lr, cfg.min_lr, cfg.epochs, cfg.factor, cfg.patience)?;

    Ok(Box::new(BurnFoldSession {
        model,
        optim,
        schedule,
        criterion:     cfg.criterion(),
        train_loader,
        valid_loader,
        train_len:     split.train.len(),
        valid_len:     split.valid.len(),
        best_score:    None,
        best_accuracy: None,
        checkpoints:   CheckpointManager::new(cfg.run_dir()),
        epochs:        cfg.epochs,
    }))
}

/// Shuffled training loader of fold `fold`.
///
/// Single worker: batches arrive in shuffle order, so a fixed seed
/// replays the same epoch.
fn train_loader<B: Backend>(
    cfg:     &RunConfig,
    fold:    usize,
    samples: &SampleSet,
    device:  &B::Device,
) -> Arc<dyn DataLoader<RetinaBatch<B>>> {
    let dataset = RetinaDataset::new(
        samples.clone(),
        ImageTransform::Train { img_size: cfg.img_size, input_size: cfg.input_size, aug: cfg.augment.clone() },
    );
    DataLoaderBuilder::new(RetinaBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.fold_seed.wrapping_add(fold as u64))
        .build(dataset)
}

impl<B, O> FoldSession for BurnFoldSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<GcnGrader<B>, B>,
{
    fn train_epoch(&mut self, epoch: usize) -> Result<PhaseMetrics> {
        let lr = self.schedule.lr();
        let (model, m) = train_epoch(
            self.model.clone(),
            &mut self.optim,
            lr,
            self.train_loader.as_ref(),
            self.train_len,
            &self.criterion,
        )?;
        self.model = model;

        tracing::info!(
            "Epoch {:>3}/{} | lr={:.2e} | loss={:.4} | score={:.4} | ac={:.4} | f1={:.4}",
            epoch, self.epochs, lr, m.loss, m.score, m.ac_score, m.f1_score,
        );
        Ok(m)
    }

    fn validate_epoch(&mut self, epoch: usize) -> Result<ValidationOutcome> {
        // dropout off, batch norm uses running statistics
        let model_valid = self.model.valid();
        let summary = evaluate_epoch(&model_valid, self.valid_loader.as_ref(), self.valid_len, &self.criterion)?;
        let m = &summary.metrics;

        tracing::info!(
            "Epoch {:>3}/{} | val_loss={:.4} | val_score={:.4} | val_ac={:.4} | val_f1={:.4}",
            epoch, self.epochs, m.loss, m.score, m.ac_score, m.f1_score,
        );
        Ok(ValidationOutcome { metrics: summary.metrics, aux: summary.aux })
    }

    fn advance_schedule(&mut self, val_loss: f64) -> f64 {
        self.schedule.step(val_loss)
    }

    fn snapshot_best(&mut self, criterion: SelectionCriterion) {
        let kept = Some(self.model.clone());
        match criterion {
            SelectionCriterion::Score    => self.best_score = kept,
            SelectionCriterion::Accuracy => self.best_accuracy = kept,
        }
    }

    fn finish(&mut self, fold: usize) -> Result<()> {
        for (criterion, kept) in [
            (SelectionCriterion::Score, &self.best_score),
            (SelectionCriterion::Accuracy, &self.best_accuracy),
        ] {
            let model = match kept {
                Some(m) => m,
                None => {
                    tracing::warn!(
                        "Fold {fold}: no epoch improved the {} criterion, saving final weights",
                        criterion.label()
                    );
                    &self.model
                }
            };
            self.checkpoints.save_model(model, criterion, fold)?;
        }
        Ok(())
    }
}
