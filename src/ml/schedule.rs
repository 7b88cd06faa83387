// ============================================================
// Layer 5 — Learning-Rate Schedules
// ============================================================
// Stepped once per epoch, after validation.
//
//   CosineAnnealing  lr_t = min + (base - min) * (1 + cos(pi * t / T)) / 2
//                    with T = number of epochs
//   ReduceOnPlateau  lr  *= factor once val_loss has not improved
//                    (relative threshold 1e-4) for more than
//                    `patience` epochs; never below min_lr
//
// Burn's LrScheduler::step takes no validation loss and yields a
// rate only by advancing. Here the rate in force is readable
// without stepping, the plateau variant sees val_loss, and cosine
// holds at min_lr once T epochs have passed instead of restarting.

use crate::domain::error::TrainError;
use crate::domain::options::SchedulerKind;

const PLATEAU_THRESHOLD: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub enum LrSchedule {
    Cosine {
        base_lr: f64,
        min_lr:  f64,
        t_max:   usize,
        step:    usize,
    },
    Plateau {
        lr:        f64,
        min_lr:    f64,
        factor:    f64,
        patience:  usize,
        best:      f64,
        bad_epochs: usize,
    },
}

impl LrSchedule {
    pub fn new(
        kind:     SchedulerKind,
        base_lr:  f64,
        min_lr:   f64,
        epochs:   usize,
        factor:   f64,
        patience: usize,
    ) -> Result<Self, TrainError> {
        if !(base_lr > 0.0 && base_lr.is_finite()) {
            return Err(TrainError::config(format!("learning rate must be positive, got {base_lr}")));
        }
        if min_lr < 0.0 || min_lr > base_lr {
            return Err(TrainError::config(format!("min_lr {min_lr} must be within 0..={base_lr}")));
        }
        Ok(match kind {
            SchedulerKind::CosineAnnealing => Self::Cosine {
                base_lr,
                min_lr,
                t_max: epochs.max(1),
                step:  0,
            },
            SchedulerKind::ReduceOnPlateau => {
                if !(factor > 0.0 && factor < 1.0) {
                    return Err(TrainError::config(format!("plateau factor must be within (0, 1), got {factor}")));
                }
                Self::Plateau {
                    lr: base_lr,
                    min_lr,
                    factor,
                    patience,
                    best: f64::INFINITY,
                    bad_epochs: 0,
                }
            }
        })
    }

    /// Learning rate for the coming epoch.
    pub fn lr(&self) -> f64 {
        match self {
            Self::Cosine { base_lr, min_lr, t_max, step } => {
                let progress = std::f64::consts::PI * (*step as f64) / (*t_max as f64);
                min_lr + (base_lr - min_lr) * (1.0 + progress.cos()) / 2.0
            }
            Self::Plateau { lr, .. } => *lr,
        }
    }

    /// Advance by one epoch and return the new rate.
    pub fn step(&mut self, val_loss: f64) -> f64 {
        match self {
            Self::Cosine { step, t_max, .. } => {
                *step = (*step + 1).min(*t_max);
            }
            Self::Plateau { lr, min_lr, factor, patience, best, bad_epochs } => {
                if val_loss < *best * (1.0 - PLATEAU_THRESHOLD) {
                    *best = val_loss;
                    *bad_epochs = 0;
                } else {
                    *bad_epochs += 1;
                }
                if *bad_epochs > *patience {
                    *lr = (*lr * *factor).max(*min_lr);
                    *bad_epochs = 0;
                }
            }
        }
        self.lr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_reaches_min_at_end() {
        let mut s = LrSchedule::new(SchedulerKind::CosineAnnealing, 1e-3, 1e-5, 4, 0.5, 5).unwrap();
        assert!((s.lr() - 1e-3).abs() < 1e-12);
        let mid = { s.step(1.0); s.step(1.0) };
        assert!((mid - (1e-5 + (1e-3 - 1e-5) / 2.0)).abs() < 1e-12);
        s.step(1.0);
        let last = s.step(1.0);
        assert!((last - 1e-5).abs() < 1e-12);
        assert!((s.step(1.0) - 1e-5).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_holds_minimum_after_last_epoch() {
        let mut s = LrSchedule::new(SchedulerKind::CosineAnnealing, 1e-2, 1e-4, 3, 0.5, 5).unwrap();
        let rates: Vec<f64> = (0..10).map(|_| s.step(1.0)).collect();
        assert!(rates[..3].windows(2).all(|w| w[1] < w[0]));
        assert!(rates[2..].iter().all(|lr| (lr - 1e-4).abs() < 1e-12));
        // reading the rate does not advance the schedule
        assert_eq!(s.lr(), s.lr());
    }

    #[test]
    fn test_plateau_reduces_after_patience() {
        let mut s = LrSchedule::new(SchedulerKind::ReduceOnPlateau, 0.1, 0.01, 10, 0.5, 1).unwrap();
        assert_eq!(s.step(1.0), 0.1);
        assert_eq!(s.step(1.0), 0.1);
        assert_eq!(s.step(1.0), 0.05);
        assert_eq!(s.step(0.5), 0.05);
        s.step(0.5);
        s.step(0.5);
        s.step(0.5);
        s.step(0.5);
        s.step(0.5);
        s.step(0.5);
        assert_eq!(s.lr(), 0.01);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(LrSchedule::new(SchedulerKind::CosineAnnealing, 0.0, 0.0, 3, 0.5, 1).is_err());
        assert!(LrSchedule::new(SchedulerKind::CosineAnnealing, 1e-3, 1e-2, 3, 0.5, 1).is_err());
        assert!(LrSchedule::new(SchedulerKind::ReduceOnPlateau, 1e-3, 0.0, 3, 1.5, 1).is_err());
    }
}
