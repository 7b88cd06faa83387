// ============================================================
// Layer 3 — Run Summary Tables
// ============================================================
// One table per selection criterion. Each finished fold adds a
// row; the mean row is derived on demand so it is always the
// arithmetic mean of the rows present at that moment.

use crate::domain::fold_state::{BestSnapshot, FoldOutcome, SelectionCriterion};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryRow {
    pub fold: usize,
    pub best: BestSnapshot,
}

/// Column means over every fold row. `best_epoch` has no mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryMean {
    pub best_loss:     f64,
    pub best_score:    f64,
    pub best_ac_score: f64,
    pub best_f1_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    criterion: SelectionCriterion,
    rows:      Vec<SummaryRow>,
}

impl SummaryTable {
    pub const COLUMNS: [&'static str; 6] = [
        "fold", "best_loss", "best_score", "best_ac_score", "best_f1_score", "best_epoch",
    ];

    pub fn new(criterion: SelectionCriterion) -> Self {
        Self { criterion, rows: Vec::new() }
    }

    pub fn criterion(&self) -> SelectionCriterion {
        self.criterion
    }

    pub fn push(&mut self, outcome: &FoldOutcome) {
        self.rows.push(SummaryRow { fold: outcome.fold, best: *outcome.snapshot(self.criterion) });
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn mean(&self) -> Option<SummaryMean> {
        if self.rows.is_empty() {
            return None;
        }
        let n    = self.rows.len() as f64;
        let mean = |f: fn(&BestSnapshot) -> f64| self.rows.iter().map(|r| f(&r.best)).sum::<f64>() / n;
        Some(SummaryMean {
            best_loss:     mean(|b| b.loss),
            best_score:    mean(|b| b.score),
            best_ac_score: mean(|b| b.ac_score),
            best_f1_score: mean(|b| b.f1_score),
        })
    }

    /// Rows as strings, fold rows first and the mean row last.
    pub fn records(&self) -> Vec<[String; 6]> {
        let mut out: Vec<[String; 6]> = self
            .rows
            .iter()
            .map(|r| {
                [
                    r.fold.to_string(),
                    r.best.loss.to_string(),
                    r.best.score.to_string(),
                    r.best.ac_score.to_string(),
                    r.best.f1_score.to_string(),
                    r.best.epoch.to_string(),
                ]
            })
            .collect();

        if let Some(m) = self.mean() {
            out.push([
                "mean".to_string(),
                m.best_loss.to_string(),
                m.best_score.to_string(),
                m.best_ac_score.to_string(),
                m.best_f1_score.to_string(),
                String::new(),
            ]);
        }
        out
    }
}
