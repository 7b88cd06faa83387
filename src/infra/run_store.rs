// ============================================================
// Layer 6 — Run Directory
// ============================================================
// The on-disk ArtifactStore. One directory per named run:
//
//   models/<run>/
//     log_<k>.csv            per-epoch metrics of fold k
//     adjacency_<k>.json     correlation matrix at the best-score epoch
//     fold_<k>.done          written after fold k saved its weights
//     results.csv            best-score summary
//     results_accuracy.csv   best-accuracy summary
//
// A fold counts as complete only through its marker file; a log
// without a marker is an interrupted fold and is trained again.

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::fold_state::{EpochRow, SelectionCriterion};
use crate::domain::summary::SummaryTable;
use crate::domain::traits::{ArtifactStore, AuxMatrix};
use crate::infra::metrics::{self, EpochLog};

pub struct RunDirectory {
    dir: PathBuf,
}

impl RunDirectory {
    /// Create the directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open a run directory that must already exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            anyhow::bail!("Run directory '{}' does not exist", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self, fold: usize) -> PathBuf {
        self.dir.join(format!("log_{fold}.csv"))
    }

    pub fn aux_path(&self, fold: usize) -> PathBuf {
        self.dir.join(format!("adjacency_{fold}.json"))
    }

    pub fn marker_path(&self, fold: usize) -> PathBuf {
        self.dir.join(format!("fold_{fold}.done"))
    }

    pub fn summary_path(&self, criterion: SelectionCriterion) -> PathBuf {
        match criterion {
            SelectionCriterion::Score    => self.dir.join("results.csv"),
            SelectionCriterion::Accuracy => self.dir.join("results_accuracy.csv"),
        }
    }

    pub fn read_summary(&self, criterion: SelectionCriterion) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        metrics::read_summary(&self.summary_path(criterion))
    }
}

impl ArtifactStore for RunDirectory {
    fn is_fold_complete(&self, fold: usize) -> Result<bool> {
        Ok(self.marker_path(fold).is_file())
    }

    fn mark_fold_complete(&self, fold: usize) -> Result<()> {
        let path = self.marker_path(fold);
        fs::write(&path, format!("fold {fold} complete\n"))
            .with_context(|| format!("Cannot write marker '{}'", path.display()))
    }

    fn read_log(&self, fold: usize) -> Result<Vec<EpochRow>> {
        EpochLog::new(fold, self.log_path(fold)).read()
    }

    fn write_log(&self, fold: usize, rows: &[EpochRow]) -> Result<()> {
        EpochLog::new(fold, self.log_path(fold)).write(rows)
    }

    fn write_aux(&self, fold: usize, aux: &AuxMatrix) -> Result<()> {
        let path = self.aux_path(fold);
        fs::write(&path, serde_json::to_string(aux)?)
            .with_context(|| format!("Cannot write matrix '{}'", path.display()))?;
        tracing::debug!("Stored correlation matrix of fold {fold} in '{}'", path.display());
        Ok(())
    }

    fn write_summary(&self, table: &SummaryTable) -> Result<()> {
        metrics::write_summary(&self.summary_path(table.criterion()), table)
    }
}

// ─── In-memory store for orchestration tests ─────────────────────────────────
#[cfg(test)]
pub use memory::MemoryStore;
