// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a cross-validated training run in order:
//
//   Step 1: Validate the run configuration      (Layer 2)
//   Step 2: Create the run directory            (Layer 6 - infra)
//   Step 3: Save config.json / config.txt       (Layer 6 - infra)
//   Step 4: Compose one FoldSplit per fold      (Layer 4 - data)
//   Step 5: Pick the compute backend            (Layer 5 - ml)
//   Step 6: Run every fold, writing summaries   (Layer 2)
//
// Nothing is trained if steps 1-4 fail.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::AutodiffBackend,
};

use crate::application::orchestrator::{RunOrchestrator, RunSummary};
use crate::data::augment::AugmentConfig;
use crate::data::catalog::DatasetCatalog;
use crate::data::composer::{ComposeOptions, DatasetComposer};
use crate::domain::error::TrainError;
use crate::domain::options::{
    DatasetSelection, DeviceKind, LossKind, OptimizerKind, PredictionKind, SchedulerKind,
};
use crate::domain::sample::FoldSplit;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::run_store::RunDirectory;
use crate::ml::criterion::Criterion;
use crate::ml::model::Backbone;
use crate::ml::trainer::open_fold_session;

pub const DEFAULT_FOLD_SEED: u64 = 41;

// ─── Run Configuration ───────────────────────────────────────────────────────
// Every tunable of a run, with string flags already resolved to
// enums. Saved to the run directory before the first fold starts
// and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name:              String,
    pub output_dir:        PathBuf,
    pub arch:              Backbone,
    pub dropout:           f64,
    pub loss:              LossKind,
    pub reg_coef:          f64,
    pub cls_coef:          f64,
    pub prediction:        PredictionKind,
    pub epochs:            usize,
    pub batch_size:        usize,
    pub img_size:          u32,
    pub input_size:        u32,
    pub optimizer:         OptimizerKind,
    pub lr:                f64,
    pub min_lr:            f64,
    pub momentum:          f64,
    pub weight_decay:      f64,
    pub nesterov:          bool,
    pub scheduler:         SchedulerKind,
    pub factor:            f64,
    pub patience:          usize,
    pub augment:           AugmentConfig,
    pub datasets:          DatasetSelection,
    pub cv:                bool,
    pub n_splits:          usize,
    pub fold_seed:         u64,
    pub remove_duplicates: bool,
    pub pseudo_labels:     Option<String>,
    pub pretrained:        Option<String>,
    pub device:            DeviceKind,
    pub catalog:           Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let arch     = Backbone::CnnSmall;
        let datasets = DatasetSelection::default();
        Self {
            name:              Self::default_name(arch, &datasets),
            output_dir:        PathBuf::from("models"),
            arch,
            dropout:           0.0,
            loss:              LossKind::CrossEntropy,
            reg_coef:          1.0,
            cls_coef:          0.1,
            prediction:        PredictionKind::Classification,
            epochs:            30,
            batch_size:        32,
            img_size:          288,
            input_size:        256,
            optimizer:         OptimizerKind::Sgd,
            lr:                1e-3,
            min_lr:            1e-5,
            momentum:          0.9,
            weight_decay:      1e-4,
            nesterov:          false,
            scheduler:         SchedulerKind::CosineAnnealing,
            factor:            0.5,
            patience:          5,
            augment:           AugmentConfig::default(),
            datasets,
            cv:                true,
            n_splits:          5,
            fold_seed:         DEFAULT_FOLD_SEED,
            remove_duplicates: false,
            pseudo_labels:     None,
            pretrained:        None,
            device:            DeviceKind::Wgpu,
            catalog:           None,
        }
    }
}

impl RunConfig {
    /// Run name used when none is given, e.g. `gcn_cnn_small_aptos2019`.
    pub fn default_name(arch: Backbone, datasets: &DatasetSelection) -> String {
        format!("gcn_{arch}_{}", datasets.slug())
    }

    pub fn run_dir(&self) -> PathBuf {
        self.output_dir.join(&self.name)
    }

    pub fn num_outputs(&self) -> usize {
        self.prediction.num_outputs()
    }

    pub fn criterion(&self) -> Criterion {
        Criterion::from_kind(self.loss, self.reg_coef, self.cls_coef)
    }

    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            n_splits:          self.n_splits,
            seed:              self.fold_seed,
            img_size:          self.img_size,
            remove_duplicates: self.remove_duplicates,
            pseudo_labels:     self.pseudo_labels.clone(),
        }
    }

    /// Cross-field checks. Every failure is a configuration error.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.name.trim().is_empty() {
            return Err(TrainError::config("run name must not be empty"));
        }
        self.prediction.check_loss(self.loss)?;
        if self.epochs == 0 {
            return Err(TrainError::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(TrainError::config("batch size must be at least 1"));
        }
        if self.n_splits < 2 {
            return Err(TrainError::config(format!("need at least 2 folds, got {}", self.n_splits)));
        }
        if self.input_size == 0 || self.input_size > self.img_size {
            return Err(TrainError::config(format!(
                "input size {} must be within 1..={}",
                self.input_size, self.img_size
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainError::config(format!("dropout {} must be within 0..1", self.dropout)));
        }
        if self.pretrained.as_deref() == Some(self.name.as_str()) {
            return Err(TrainError::config("a run cannot be pretrained from itself"));
        }
        self.augment.validate()
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Execute the run end to end and return both summary tables.
    pub fn execute(&self) -> Result<RunSummary> {
        let cfg = &self.config;

        // ── Step 1: Fail fast on bad combinations ────────────────────────────
        cfg.validate()?;

        // ── Steps 2-3: Run directory and config snapshot ─────────────────────
        let run = RunDirectory::create(cfg.run_dir())?;
        CheckpointManager::new(run.dir()).save_config(cfg)?;
        tracing::info!("Run '{}' in '{}'", cfg.name, run.dir().display());

        // ── Step 4: Fold splits ──────────────────────────────────────────────
        let catalog = match &cfg.catalog {
            Some(path) => DatasetCatalog::load(path)?,
            None       => DatasetCatalog::default(),
        };
        let splits = DatasetComposer::new(&catalog).compose(&cfg.datasets, &cfg.compose_options())?;

        // ── Steps 5-6: Backend and folds ─────────────────────────────────────
        match cfg.device {
            DeviceKind::Wgpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.run_folds::<Autodiff<Wgpu>>(&run, &splits, device)
            }
            DeviceKind::Cpu => {
                tracing::info!("Using CPU (ndarray) backend");
                self.run_folds::<Autodiff<NdArray>>(&run, &splits, NdArrayDevice::Cpu)
            }
        }
    }

    fn run_folds<B: AutodiffBackend>(
        &self,
        run:    &RunDirectory,
        splits: &[FoldSplit],
        device: B::Device,
    ) -> Result<RunSummary> {
        let cfg = &self.config;
        RunOrchestrator::new(run, cfg.epochs, cfg.cv)
            .run(splits, |fold, split| open_fold_session::<B>(cfg, fold, split, &device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.name, "gcn_cnn_small_aptos2019+diabetic_retinopathy");
        assert_eq!(cfg.fold_seed, 41);
        assert_eq!(cfg.num_outputs(), 5);
        assert_eq!(cfg.run_dir(), PathBuf::from("models/gcn_cnn_small_aptos2019+diabetic_retinopathy"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_mismatched_loss_rejected() {
        let cfg = RunConfig { loss: LossKind::Mse, ..RunConfig::default() };
        assert!(matches!(cfg.validate(), Err(TrainError::Configuration(_))));

        let cfg = RunConfig {
            loss: LossKind::Multitask,
            prediction: PredictionKind::Multitask,
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.num_outputs(), 6);
        assert_eq!(cfg.criterion(), Criterion::Multitask { reg_coef: 1.0, cls_coef: 0.1 });
    }

    #[test]
    fn test_bad_sizes_rejected() {
        for cfg in [
            RunConfig { input_size: 300, ..RunConfig::default() },
            RunConfig { n_splits: 1, ..RunConfig::default() },
            RunConfig { epochs: 0, ..RunConfig::default() },
            RunConfig { dropout: 1.0, ..RunConfig::default() },
        ] {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }

    #[test]
    fn test_config_survives_json() {
        let cfg = RunConfig {
            datasets: " diabetic_retinopathy ".parse().unwrap(),
            pseudo_labels: Some("probs_v1".to_string()),
            ..RunConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"datasets\":\"diabetic_retinopathy\""));
        assert_eq!(serde_json::from_str::<RunConfig>(&json).unwrap(), cfg);
    }

    #[test]
    fn test_missing_tables_stop_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            output_dir: dir.path().to_path_buf(),
            device:     DeviceKind::Cpu,
            catalog:    None,
            ..RunConfig::default()
        };
        let err = TrainUseCase::new(cfg.clone()).execute().unwrap_err();
        assert!(err.to_string().contains("train.csv"));
        // config snapshot is written before data is read
        assert!(cfg.run_dir().join("config.json").exists());
        assert!(!cfg.run_dir().join("results.csv").exists());
    }
}
