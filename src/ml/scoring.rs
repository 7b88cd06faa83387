// ============================================================
// Layer 5 — Scoring
// ============================================================
// Metric formulas over plain grade vectors, and the running
// means the epoch driver accumulates them into.
//
//   quadratic_weighted_kappa → ranking score (model selection)
//   accuracy                 → exact-grade hit rate
//   macro_f1                 → unweighted mean F1 over grades
//
// Model outputs become grades with grades_from_output():
// one column is a regressed grade (rounded, clamped), several
// columns are class logits (argmax).

use crate::domain::fold_state::PhaseMetrics;
use crate::domain::options::NUM_GRADES;

/// Convert a row-major `[n, width]` output into grades.
pub fn grades_from_output(values: &[f32], width: usize) -> Vec<i64> {
    if width <= 1 {
        let top = (NUM_GRADES - 1) as f32;
        return values
            .iter()
            .map(|v| if v.is_nan() { 0 } else { v.round().clamp(0.0, top) as i64 })
            .collect();
    }
    values
        .chunks(width)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0 as i64
        })
        .collect()
}

/// Cohen's kappa with quadratic weights over `num_grades` grades.
///
/// Two constant, identical gradings score 1.0; any other grading
/// with no expected disagreement scores 0.0.
pub fn quadratic_weighted_kappa(pred: &[i64], target: &[i64], num_grades: usize) -> f64 {
    let k = num_grades.max(2);
    let n = pred.len().min(target.len());
    if n == 0 {
        return 0.0;
    }
    let clamp = |g: i64| g.clamp(0, k as i64 - 1) as usize;

    let mut observed  = vec![vec![0.0f64; k]; k];
    let mut hist_pred = vec![0.0f64; k];
    let mut hist_true = vec![0.0f64; k];
    for (&p, &t) in pred.iter().zip(target) {
        let (p, t) = (clamp(p), clamp(t));
        observed[t][p] += 1.0;
        hist_pred[p]   += 1.0;
        hist_true[t]   += 1.0;
    }

    let denom_w = ((k - 1) * (k - 1)) as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..k {
        for j in 0..k {
            let w = ((i as f64 - j as f64).powi(2)) / denom_w;
            num += w * observed[i][j];
            den += w * hist_true[i] * hist_pred[j] / n as f64;
        }
    }

    if den == 0.0 {
        return if num == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - num / den
}

pub fn accuracy(pred: &[i64], target: &[i64]) -> f64 {
    let n = pred.len().min(target.len());
    if n == 0 {
        return 0.0;
    }
    let hits = pred.iter().zip(target).filter(|(p, t)| p == t).count();
    hits as f64 / n as f64
}

/// Macro F1 over every grade that occurs in either vector.
pub fn macro_f1(pred: &[i64], target: &[i64]) -> f64 {
    let mut grades: Vec<i64> = pred.iter().chain(target).copied().collect();
    grades.sort_unstable();
    grades.dedup();
    if grades.is_empty() {
        return 0.0;
    }

    let total: f64 = grades
        .iter()
        .map(|&g| {
            let mut tp = 0usize;
            let mut fp = 0usize;
            let mut fneg = 0usize;
            for (&p, &t) in pred.iter().zip(target) {
                match (p == g, t == g) {
                    (true, true)  => tp += 1,
                    (true, false) => fp += 1,
                    (false, true) => fneg += 1,
                    _ => {}
                }
            }
            let denom = 2 * tp + fp + fneg;
            if denom == 0 { 0.0 } else { 2.0 * tp as f64 / denom as f64 }
        })
        .sum();
    total / grades.len() as f64
}

/// Score / accuracy / F1 of one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchScores {
    pub score:    f64,
    pub ac_score: f64,
    pub f1_score: f64,
}

impl BatchScores {
    pub fn compute(pred: &[i64], target: &[i64]) -> Self {
        Self {
            score:    quadratic_weighted_kappa(pred, target, NUM_GRADES),
            ac_score: accuracy(pred, target),
            f1_score: macro_f1(pred, target),
        }
    }
}

// ─── Running means ────────────────────────────────────────────────────────────
/// Sample-weighted running mean of a scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AverageMeter {
    sum:   f64,
    count: usize,
}

impl AverageMeter {
    pub fn update(&mut self, value: f64, n: usize) {
        self.sum   += value * n as f64;
        self.count += n;
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// The four meters of one pass over a loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseMeter {
    loss:     AverageMeter,
    score:    AverageMeter,
    ac_score: AverageMeter,
    f1_score: AverageMeter,
}

impl PhaseMeter {
    pub fn update(&mut self, loss: f64, scores: &BatchScores, batch_size: usize) {
        self.loss.update(loss, batch_size);
        self.score.update(scores.score, batch_size);
        self.ac_score.update(scores.ac_score, batch_size);
        self.f1_score.update(scores.f1_score, batch_size);
    }

    pub fn samples(&self) -> usize {
        self.loss.count()
    }

    pub fn averages(&self) -> PhaseMetrics {
        PhaseMetrics {
            loss:     self.loss.avg(),
            score:    self.score.avg(),
            ac_score: self.ac_score.avg(),
            f1_score: self.f1_score.avg(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grades_from_logits_and_regression() {
        let logits = [0.1, 2.0, 0.3, -1.0, 0.0, 5.0, 1.0, 1.0, 1.0, 1.0];
        assert_eq!(grades_from_output(&logits, 5), vec![1, 0]);
        assert_eq!(grades_from_output(&[-0.7, 1.49, 2.5, 9.0], 1), vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_kappa_perfect_and_reversed() {
        let t = [0, 1, 2, 3, 4];
        assert!((quadratic_weighted_kappa(&t, &t, 5) - 1.0).abs() < 1e-12);
        let reversed = [4, 3, 2, 1, 0];
        assert!((quadratic_weighted_kappa(&reversed, &t, 5) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_kappa_constant_inputs() {
        assert_eq!(quadratic_weighted_kappa(&[2, 2], &[2, 2], 5), 1.0);
        assert_eq!(quadratic_weighted_kappa(&[1, 1], &[2, 2], 5), 0.0);
        assert_eq!(quadratic_weighted_kappa(&[], &[], 5), 0.0);
    }

    #[test]
    fn test_accuracy_and_f1() {
        let pred   = [0, 1, 1, 2];
        let target = [0, 1, 2, 2];
        assert_eq!(accuracy(&pred, &target), 0.75);
        // grade 0: f1 1.0, grade 1: 2/3, grade 2: 2/3
        let expected = (1.0 + 2.0 / 3.0 + 2.0 / 3.0) / 3.0;
        assert!((macro_f1(&pred, &target) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_meter_is_batch_size_weighted() {
        let mut meter = PhaseMeter::default();
        let s = |v| BatchScores { score: v, ac_score: v, f1_score: v };
        meter.update(1.0, &s(1.0), 30);
        meter.update(3.0, &s(0.0), 10);
        let avg = meter.averages();
        assert_eq!(avg.loss, 1.5);
        assert_eq!(avg.score, 0.75);
        assert_eq!(meter.samples(), 40);
        assert_eq!(AverageMeter::default().avg(), 0.0);
    }
}
