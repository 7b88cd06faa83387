// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder,
// and the run configuration next to them.
//
// File naming convention inside a run directory:
//   models/<run>/
//     model_1.mpk            ← fold 1, best validation score
//     model_accuracy_1.mpk   ← fold 1, best validation accuracy
//     ...
//     config.json               ← RunConfig, reloadable
//     config.txt                ← RunConfig, one "- key: value" per line
//
// CompactRecorder appends the extension itself, so paths are
// built without it. Loading fails if the architecture differs
// from the one the weights were saved with.

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::RunConfig;
use crate::domain::fold_state::SelectionCriterion;
use crate::ml::model::GcnGrader;

pub struct CheckpointManager {
    /// Run directory holding the weight files
    dir: PathBuf,
}

impl CheckpointManager {
    /// Does not touch the filesystem; writers create `dir` on demand.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Weight file of a fold, without the recorder's extension.
    pub fn weights_path(&self, criterion: SelectionCriterion, fold: usize) -> PathBuf {
        match criterion {
            SelectionCriterion::Score    => self.dir.join(format!("model_{fold}")),
            SelectionCriterion::Accuracy => self.dir.join(format!("model_accuracy_{fold}")),
        }
    }

    pub fn save_model<B: Backend>(
        &self,
        model:     &GcnGrader<B>,
        criterion: SelectionCriterion,
        fold:      usize,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.weights_path(criterion, fold);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save weights to '{}'", path.display()))?;

        tracing::debug!("Saved {} weights of fold {fold} to '{}'", criterion.label(), path.display());
        Ok(())
    }

    /// Load saved weights into a model of the same architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:     GcnGrader<B>,
        criterion: SelectionCriterion,
        fold:      usize,
        device:    &B::Device,
    ) -> Result<GcnGrader<B>> {
        let path = self.weights_path(criterion, fold);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load weights '{}'", path.display()))?;

        tracing::info!("Loaded weights from '{}'", path.display());
        Ok(model.load_record(record))
    }

    /// Write config.json and config.txt before training starts.
    pub fn save_config(&self, cfg: &RunConfig) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let json_path = self.dir.join("config.json");
        let value     = serde_json::to_value(cfg)?;
        fs::write(&json_path, serde_json::to_string_pretty(&value)?)
            .with_context(|| format!("Cannot write config to '{}'", json_path.display()))?;

        let mut text = String::new();
        if let serde_json::Value::Object(map) = &value {
            for (key, v) in map {
                match v {
                    serde_json::Value::String(s) => text.push_str(&format!("- {key}: {s}\n")),
                    other                        => text.push_str(&format!("- {key}: {other}\n")),
                }
            }
        }
        let txt_path = self.dir.join("config.txt");
        fs::write(&txt_path, text)
            .with_context(|| format!("Cannot write config to '{}'", txt_path.display()))?;

        tracing::debug!("Saved run config to '{}'", json_path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<RunConfig> {
        let path = self.dir.join("config.json");
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::ml::model::Backbone;

    #[test]
    fn test_weights_round_trip() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let ckpt   = CheckpointManager::new(dir.path().join("run"));

        let model: GcnGrader<NdArray> = Backbone::CnnTiny.config(5, 0.0).init(&device);
        ckpt.save_model(&model, SelectionCriterion::Accuracy, 2).unwrap();
        assert!(dir.path().join("run/model_accuracy_2.mpk").exists());

        let fresh: GcnGrader<NdArray> = Backbone::CnnTiny.config(5, 0.0).init(&device);
        let loaded = ckpt.load_model(fresh, SelectionCriterion::Accuracy, 2, &device).unwrap();
        let a: Vec<f32> = model.head.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.head.weight.val().into_data().to_vec().unwrap();
        assert_eq!(a, b);

        let missing = ckpt.load_model(loaded, SelectionCriterion::Score, 2, &device);
        assert!(missing.is_err());
    }

    #[test]
    fn test_config_files() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        let cfg  = RunConfig::default();
        ckpt.save_config(&cfg).unwrap();

        assert_eq!(ckpt.load_config().unwrap(), cfg);
        let text = fs::read_to_string(dir.path().join("config.txt")).unwrap();
        assert!(text.contains(&format!("- name: {}\n", cfg.name)));
        assert!(text.contains("- epochs: 30\n"));
    }
}
