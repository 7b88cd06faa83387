// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// CSV files for per-epoch logs and per-run summaries.
//
// Epoch log (log_<k>.csv), rewritten whole after every epoch so
// the file on disk always holds every finished epoch:
//   epoch,loss,score,ac_score,f1_score,val_loss,val_score,val_ac_score,val_f1_score
//   1,1.391200,0.120000,0.480000,0.210000,1.301100,0.250000,0.520000,0.240000
//   ...
//
// Summary (results.csv / results_accuracy.csv), one row per
// finished fold plus a trailing mean row:
//   fold,best_loss,best_score,best_ac_score,best_f1_score,best_epoch
//   1,0.74,0.86,0.79,0.61,12
//   mean,0.74,0.86,0.79,0.61,
//
// Reading a log back checks that every column is present, so a
// log written by something else surfaces as a ResumeMismatch.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::domain::error::TrainError;
use crate::domain::fold_state::EpochRow;
use crate::domain::summary::SummaryTable;

/// One fold's epoch log file.
pub struct EpochLog {
    fold: usize,
    path: PathBuf,
}

impl EpochLog {
    pub fn new(fold: usize, path: impl Into<PathBuf>) -> Self {
        Self { fold, path: path.into() }
    }

    /// Replace the file with `rows`, header first.
    pub fn write(&self, rows: &[EpochRow]) -> Result<()> {
        let mut w = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)
            .with_context(|| format!("Cannot create epoch log '{}'", self.path.display()))?;

        w.write_record(EpochRow::COLUMNS)?;
        for r in rows {
            w.write_record([
                r.epoch.to_string(),
                format!("{:.6}", r.loss),
                format!("{:.6}", r.score),
                format!("{:.6}", r.ac_score),
                format!("{:.6}", r.f1_score),
                format!("{:.6}", r.val_loss),
                format!("{:.6}", r.val_score),
                format!("{:.6}", r.val_ac_score),
                format!("{:.6}", r.val_f1_score),
            ])?;
        }
        w.flush()
            .with_context(|| format!("Cannot write epoch log '{}'", self.path.display()))?;

        tracing::debug!("Wrote {} epoch rows to '{}'", rows.len(), self.path.display());
        Ok(())
    }

    /// Read every row back, in file order.
    pub fn read(&self) -> Result<Vec<EpochRow>> {
        if !self.path.exists() {
            return Err(TrainError::resume(
                self.fold,
                format!("epoch log '{}' is missing", self.path.display()),
            )
            .into());
        }

        let mut r = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Cannot open epoch log '{}'", self.path.display()))?;

        let headers = r.headers()?.clone();
        if let Some(missing) = EpochRow::COLUMNS.iter().find(|c| !headers.iter().any(|h| h == **c)) {
            return Err(TrainError::resume(
                self.fold,
                format!("epoch log '{}' has no '{missing}' column", self.path.display()),
            )
            .into());
        }

        let mut rows = Vec::new();
        for rec in r.deserialize::<EpochRow>() {
            let row = rec.map_err(|e| {
                TrainError::resume(self.fold, format!("unreadable row in '{}': {e}", self.path.display()))
            })?;
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Replace a summary CSV with the table's rows and its mean row.
pub fn write_summary(path: &Path, table: &SummaryTable) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Cannot create summary '{}'", path.display()))?;

    w.write_record(SummaryTable::COLUMNS)?;
    for rec in table.records() {
        w.write_record(&rec)?;
    }
    w.flush()
        .with_context(|| format!("Cannot write summary '{}'", path.display()))?;

    tracing::debug!(
        "Wrote {} summary ({} folds) to '{}'",
        table.criterion().label(),
        table.rows().len(),
        path.display()
    );
    Ok(())
}

/// Header and rows of a summary CSV, as strings.
pub fn read_summary(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut r = csv::Reader::from_path(path)
        .with_context(|| format!("Cannot open summary '{}'", path.display()))?;

    let headers = r.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for rec in r.records() {
        rows.push(rec?.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fold_state::{BestSnapshot, FoldOutcome, PhaseMetrics, SelectionCriterion};

    fn row(epoch: usize, val_score: f64) -> EpochRow {
        let m = PhaseMetrics { loss: 1.0, score: 0.5, ac_score: 0.5, f1_score: 0.5 };
        let v = PhaseMetrics { loss: 0.9, score: val_score, ac_score: 0.6, f1_score: 0.4 };
        EpochRow::new(epoch, &m, &v)
    }

    #[test]
    fn test_log_rewrite_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_1.csv");
        let log  = EpochLog::new(1, &path);

        log.write(&[row(1, 0.25)]).unwrap();
        log.write(&[row(1, 0.25), row(2, 0.5)]).unwrap();

        let rows = log.read().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].epoch, 2);
        assert_eq!(rows[1].val_score, 0.5);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("epoch,loss,score,ac_score,f1_score,val_loss"));
    }

    #[test]
    fn test_missing_column_is_resume_mismatch() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_2.csv");
        std::fs::write(&path, "epoch,loss,val_loss\n1,0.5,0.4\n").unwrap();

        let err = EpochLog::new(2, &path).read().unwrap_err();
        match err.downcast_ref::<TrainError>() {
            Some(TrainError::ResumeMismatch { fold, detail }) => {
                assert_eq!(*fold, 2);
                assert!(detail.contains("score"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_log_is_resume_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let err = EpochLog::new(3, dir.path().join("log_3.csv")).read().unwrap_err();
        assert!(matches!(err.downcast_ref::<TrainError>(), Some(TrainError::ResumeMismatch { .. })));
    }

    #[test]
    fn test_summary_has_mean_row() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let snap = |score| BestSnapshot { loss: 0.5, score, ac_score: 0.7, f1_score: 0.3, epoch: 4 };

        let mut table = SummaryTable::new(SelectionCriterion::Score);
        for (fold, score) in [(1, 0.8), (2, 0.6)] {
            table.push(&FoldOutcome { fold, resumed: false, primary: snap(score), secondary: snap(0.0) });
        }
        write_summary(&path, &table).unwrap();

        let (headers, rows) = read_summary(&path).unwrap();
        assert_eq!(headers, SummaryTable::COLUMNS);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][0], "mean");
        assert!((rows[2][2].parse::<f64>().unwrap() - 0.7).abs() < 1e-12);
        assert_eq!(rows[2][5], "");
    }
}
