// ============================================================
// Layer 5 — Epoch Driver
// ============================================================
// One pass over a data loader.
//
//   train_epoch     forward → loss → backward → optimizer step,
//                   on the autodiff backend
//   evaluate_epoch  forward → loss, on the inner backend
//                   (model.valid(): no graph, dropout off)
//
// Both accumulate loss, kappa, accuracy and F1 per batch,
// weighted by batch size. evaluate_epoch also hands back the
// correlation matrix of the last batch it saw.
//
// A loader stops at the first image it cannot decode, so both
// passes compare the samples they saw with the dataset length
// and fail with DataIntegrity on a short pass.
//
// Key Burn insight:
//   Training uses Autodiff<B> for gradients; validation batches
//   must be built on B::InnerBackend to match model.valid().

use anyhow::{anyhow, Result};
use burn::{
    data::dataloader::DataLoader,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::RetinaBatch;
use crate::domain::error::TrainError;
use crate::domain::fold_state::PhaseMetrics;
use crate::domain::traits::AuxMatrix;
use crate::ml::criterion::Criterion;
use crate::ml::model::GcnGrader;
use crate::ml::scoring::{grades_from_output, BatchScores, PhaseMeter};

/// Metrics of one evaluation pass plus the last correlation matrix.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub metrics: PhaseMetrics,
    pub aux:     Option<AuxMatrix>,
}

pub fn train_epoch<B, O>(
    mut model: GcnGrader<B>,
    optim:     &mut O,
    lr:        f64,
    loader:    &dyn DataLoader<RetinaBatch<B>>,
    expected:  usize,
    criterion: &Criterion,
) -> Result<(GcnGrader<B>, PhaseMetrics)>
where
    B: AutodiffBackend,
    O: Optimizer<GcnGrader<B>, B>,
{
    let mut meter = PhaseMeter::default();

    for batch in loader.iter() {
        let batch_size = batch.targets.dims()[0];
        let output = model.forward(batch.images);
        let (loss, scored) = criterion.compute(output.prediction, batch.targets.clone());

        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        let scores = score_batch(scored, batch.targets)?;

        // Backward pass + optimizer update
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads);

        meter.update(loss_val, &scores, batch_size);
        tracing::debug!("train batch: n={batch_size} loss={loss_val:.4} score={:.4}", scores.score);
    }

    check_complete("training", meter.samples(), expected)?;
    Ok((model, meter.averages()))
}

pub fn evaluate_epoch<B: Backend>(
    model:     &GcnGrader<B>,
    loader:    &dyn DataLoader<RetinaBatch<B>>,
    expected:  usize,
    criterion: &Criterion,
) -> Result<EpochSummary> {
    let mut meter = PhaseMeter::default();
    let mut aux   = None;

    for batch in loader.iter() {
        let batch_size = batch.targets.dims()[0];
        let output = model.forward(batch.images);
        let (loss, scored) = criterion.compute(output.prediction, batch.targets.clone());

        let loss_val: f64 = loss.into_scalar().elem::<f64>();
        let scores = score_batch(scored, batch.targets)?;
        meter.update(loss_val, &scores, batch_size);
        aux = Some(matrix_from_tensor(output.adjacency)?);
    }

    check_complete("validation", meter.samples(), expected)?;
    Ok(EpochSummary { metrics: meter.averages(), aux })
}

fn check_complete(phase: &str, seen: usize, expected: usize) -> Result<(), TrainError> {
    if seen == 0 {
        return Err(TrainError::Resource(format!("{phase} loader produced no batches")));
    }
    if seen != expected {
        return Err(TrainError::integrity(format!(
            "{phase} pass saw {seen} of {expected} images; an image could not be read"
        )));
    }
    Ok(())
}

fn score_batch<B: Backend>(scored: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Result<BatchScores> {
    let [_, width] = scored.dims();
    let values = scored
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("cannot read predictions: {e:?}"))?;
    let target = targets
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow!("cannot read grades: {e:?}"))?;
    Ok(BatchScores::compute(&grades_from_output(&values, width), &target))
}

fn matrix_from_tensor<B: Backend>(t: Tensor<B, 2>) -> Result<AuxMatrix> {
    let [rows, cols] = t.dims();
    let values = t
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("cannot read correlation matrix: {e:?}"))?;
    Ok(AuxMatrix::from_shape_vec((rows, cols), values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::DataLoaderBuilder;
    use burn::data::dataset::InMemDataset;
    use burn::module::AutodiffModule;
    use burn::optim::SgdConfig;

    use crate::data::batcher::RetinaBatcher;
    use crate::data::augment::ImageTransform;
    use crate::data::dataset::{RetinaDataset, RetinaItem};
    use crate::domain::sample::SampleSet;
    use image::{Rgb, RgbImage};
    use crate::ml::model::Backbone;

    type TB = Autodiff<NdArray>;

    fn items(n: usize) -> Vec<RetinaItem> {
        (0..n)
            .map(|i| RetinaItem { pixels: vec![(i % 3) as f32; 3 * 8 * 8], size: 8, label: (i % 5) as u8 })
            .collect()
    }

    #[test]
    fn test_train_then_evaluate() {
        let device = Default::default();
        let model = Backbone::CnnTiny.config(5, 0.0).init::<TB>(&device);
        let mut optim = SgdConfig::new().init::<TB, GcnGrader<TB>>();

        let train = DataLoaderBuilder::new(RetinaBatcher::<TB>::new(Default::default()))
            .batch_size(2)
            .build(InMemDataset::new(items(5)));
        let valid = DataLoaderBuilder::new(RetinaBatcher::<NdArray>::new(Default::default()))
            .batch_size(4)
            .build(InMemDataset::new(items(6)));

        let (model, train_metrics) =
            train_epoch(model, &mut optim, 1e-2, train.as_ref(), 5, &Criterion::CrossEntropy).unwrap();
        assert!(train_metrics.loss.is_finite() && train_metrics.loss > 0.0);
        assert!((0.0..=1.0).contains(&train_metrics.ac_score));

        let summary = evaluate_epoch(&model.valid(), valid.as_ref(), 6, &Criterion::CrossEntropy).unwrap();
        assert!(summary.metrics.loss.is_finite());
        let aux = summary.aux.unwrap();
        assert_eq!(aux.dim(), (5, 5));
    }

    #[test]
    fn test_empty_loader_is_resource_error() {
        let device = Default::default();
        let model = Backbone::CnnTiny.config(1, 0.0).init::<NdArray>(&device);
        let empty = DataLoaderBuilder::new(RetinaBatcher::<NdArray>::new(Default::default()))
            .batch_size(2)
            .build(InMemDataset::new(Vec::new()));

        let err = evaluate_epoch(&model, empty.as_ref(), 0, &Criterion::Mse).unwrap_err();
        assert!(matches!(err.downcast_ref::<TrainError>(), Some(TrainError::Resource(_))));
    }

    #[test]
    fn test_unreadable_image_fails_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..6u8 {
            let p = dir.path().join(format!("{i}.png"));
            if i != 2 {
                RgbImage::from_pixel(10, 10, Rgb([i * 30, 60, 90])).save(&p).unwrap();
            }
            paths.push(p);
        }
        let samples = SampleSet::new(paths, vec![0, 1, 2, 3, 4, 0]).unwrap();
        let dataset = RetinaDataset::new(samples, ImageTransform::Eval { input_size: 8 });
        let loader = DataLoaderBuilder::new(RetinaBatcher::<NdArray>::new(Default::default()))
            .batch_size(1)
            .build(dataset);

        let device = Default::default();
        let model = Backbone::CnnTiny.config(5, 0.0).init::<NdArray>(&device);
        let err = evaluate_epoch(&model, loader.as_ref(), 6, &Criterion::CrossEntropy).unwrap_err();
        assert!(matches!(err.downcast_ref::<TrainError>(), Some(TrainError::DataIntegrity(_))), "{err}");
    }
}
