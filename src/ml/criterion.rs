// ============================================================
// Layer 5 — Loss Functions
// ============================================================
// Every criterion maps (prediction [N, W], grades [N]) to
//   - a scalar loss to back-propagate, and
//   - the slice of the prediction that metrics are computed on.
//
//   CrossEntropy  W = 5   burn CrossEntropyLoss
//   Focal         W = 5   -(1 - p_t)^gamma * log p_t
//   Mse           W = 1   grade regressed as a float
//   Multitask     W = 6   reg_coef * MSE(channel 0)
//                       + cls_coef * CE(channels 1..6)
//                       metrics read channel 0

use burn::{
    nn::loss::{CrossEntropyLossConfig, MseLoss, Reduction},
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::domain::options::LossKind;

pub const FOCAL_GAMMA: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    CrossEntropy,
    Focal { gamma: f64 },
    Mse,
    Multitask { reg_coef: f64, cls_coef: f64 },
}

impl Criterion {
    pub fn from_kind(kind: LossKind, reg_coef: f64, cls_coef: f64) -> Self {
        match kind {
            LossKind::CrossEntropy => Self::CrossEntropy,
            LossKind::Focal        => Self::Focal { gamma: FOCAL_GAMMA },
            LossKind::Mse          => Self::Mse,
            LossKind::Multitask    => Self::Multitask { reg_coef, cls_coef },
        }
    }

    /// Returns `(loss, scored)`; `scored` is what grades are read from.
    pub fn compute<B: Backend>(
        &self,
        output:  Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        match *self {
            Self::CrossEntropy => {
                let ce = CrossEntropyLossConfig::new().init(&output.device());
                (ce.forward(output.clone(), targets), output)
            }
            Self::Focal { gamma } => (focal_loss(output.clone(), targets, gamma), output),
            Self::Mse => (grade_mse(output.clone(), targets), output),
            Self::Multitask { reg_coef, cls_coef } => {
                let [n, width] = output.dims();
                let reg = output.clone().slice([0..n, 0..1]);
                let cls = output.slice([0..n, 1..width]);
                let ce  = CrossEntropyLossConfig::new().init(&cls.device());
                let loss = grade_mse(reg.clone(), targets.clone()).mul_scalar(reg_coef)
                    + ce.forward(cls, targets).mul_scalar(cls_coef);
                (loss, reg)
            }
        }
    }
}

/// Focal loss over softmax probabilities, averaged over the batch.
fn focal_loss<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>, gamma: f64) -> Tensor<B, 1> {
    let log_pt = log_softmax(logits, 1).gather(1, targets.unsqueeze_dim::<2>(1));
    let weight = log_pt.clone().exp().neg().add_scalar(1.0).powf_scalar(gamma);
    (weight * log_pt).neg().mean()
}

/// Mean squared error between a `[N, 1]` output and the grades as floats.
fn grade_mse<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let targets = targets.float().unsqueeze_dim::<2>(1);
    MseLoss::new().forward(output, targets, Reduction::Mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray;

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_scalar()
    }

    fn grades(v: Vec<i32>) -> Tensor<B, 1, Int> {
        let n = v.len();
        Tensor::from_data(TensorData::new(v, [n]), &Default::default())
    }

    fn floats(v: Vec<f32>, shape: [usize; 2]) -> Tensor<B, 2> {
        Tensor::from_data(TensorData::new(v, shape), &Default::default())
    }

    #[test]
    fn test_focal_is_below_cross_entropy() {
        let logits = floats(vec![2.0, 0.5, 0.1, 0.0, -1.0, 0.3, 1.5, 0.2, 0.0, 0.0], [2, 5]);
        let t = grades(vec![0, 1]);
        let (ce, _)    = Criterion::CrossEntropy.compute(logits.clone(), t.clone());
        let (focal, _) = Criterion::Focal { gamma: FOCAL_GAMMA }.compute(logits, t);
        let (ce, focal) = (scalar(ce), scalar(focal));
        assert!(focal > 0.0);
        assert!(focal < ce);
    }

    #[test]
    fn test_focal_with_zero_gamma_matches_cross_entropy() {
        let logits = floats(vec![0.2, 1.0, -0.5, 0.3, 0.0], [1, 5]);
        let t = grades(vec![3]);
        let (ce, _)    = Criterion::CrossEntropy.compute(logits.clone(), t.clone());
        let (focal, _) = Criterion::Focal { gamma: 0.0 }.compute(logits, t);
        assert!((scalar(ce) - scalar(focal)).abs() < 1e-5);
    }

    #[test]
    fn test_mse_on_regressed_grades() {
        let out = floats(vec![1.0, 3.0], [2, 1]);
        let (loss, scored) = Criterion::Mse.compute(out, grades(vec![2, 3]));
        assert!((scalar(loss) - 0.5).abs() < 1e-6);
        assert_eq!(scored.dims(), [2, 1]);
    }

    #[test]
    fn test_multitask_scores_channel_zero() {
        let out = floats(vec![2.0, 0.0, 0.0, 9.0, 0.0, 0.0], [1, 6]);
        let crit = Criterion::Multitask { reg_coef: 1.0, cls_coef: 0.0 };
        let (loss, scored) = crit.compute(out, grades(vec![2]));
        assert!(scalar(loss).abs() < 1e-6);
        assert_eq!(scored.dims(), [1, 1]);
        let v: Vec<f32> = scored.into_data().to_vec().unwrap();
        assert_eq!(v, vec![2.0]);
    }

    #[test]
    fn test_from_kind() {
        assert_eq!(Criterion::from_kind(LossKind::Focal, 1.0, 0.1), Criterion::Focal { gamma: 2.0 });
        assert_eq!(
            Criterion::from_kind(LossKind::Multitask, 1.0, 0.1),
            Criterion::Multitask { reg_coef: 1.0, cls_coef: 0.1 },
        );
    }
}
