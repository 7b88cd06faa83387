// ============================================================
// Layer 4 — Dataset Composer
// ============================================================
// Turns a dataset selection into one FoldSplit per fold.
//
//   1. Load the primary dataset and split it with a stratified
//      k-fold (fixed seed)
//   2. Append every secondary dataset, in full, to each fold's
//      training side
//   3. Append pseudo-labelled test images to each training side
//   4. Drop flagged duplicate images from both sides
//
// Validation samples only ever come from the primary dataset.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;

use crate::data::catalog::DatasetCatalog;
use crate::data::splitter::stratified_kfold;
use crate::data::tables::{read_duplicate_ids, read_label_table};
use crate::domain::error::TrainError;
use crate::domain::options::{DatasetSelection, SourceDataset};
use crate::domain::sample::{FoldSplit, SampleSet};

/// Composition flags taken from the run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeOptions {
    pub n_splits:          usize,
    pub seed:              u64,
    pub img_size:          u32,
    pub remove_duplicates: bool,
    /// Name of a prediction table under the pseudo-label directory
    pub pseudo_labels:     Option<String>,
}

pub struct DatasetComposer<'a> {
    catalog: &'a DatasetCatalog,
}

impl<'a> DatasetComposer<'a> {
    pub fn new(catalog: &'a DatasetCatalog) -> Self {
        Self { catalog }
    }

    pub fn compose(&self, selection: &DatasetSelection, opts: &ComposeOptions) -> Result<Vec<FoldSplit>> {
        let primary = self.load_source(selection.primary(), opts.img_size)?;
        tracing::info!(
            "Primary dataset '{}': {} images, grade counts {:?}",
            selection.primary(),
            primary.len(),
            primary.class_counts()
        );

        let mut train_extra = SampleSet::default();
        for &ds in selection.secondary() {
            let extra = self.load_source(ds, opts.img_size)?;
            tracing::info!("Secondary dataset '{}': {} images (train side only)", ds, extra.len());
            train_extra.extend(&extra);
        }

        if let Some(name) = &opts.pseudo_labels {
            let pseudo = self.load_pseudo_labels(name, opts.img_size)?;
            tracing::info!("Pseudo labels '{}': {} images (train side only)", name, pseudo.len());
            train_extra.extend(&pseudo);
        }

        let duplicates = if opts.remove_duplicates {
            self.load_duplicates(opts.img_size)?
        } else {
            HashSet::new()
        };

        Ok(compose_folds(&primary, &train_extra, &duplicates, opts.n_splits, opts.seed)?)
    }

    fn load_source(&self, ds: SourceDataset, img_size: u32) -> Result<SampleSet> {
        let layout = self.catalog.source(ds);
        let dir  = self.catalog.image_dir(ds, img_size);
        let rows = read_label_table(&layout.label_table, &layout.id_column, &layout.grade_column)?;

        let (paths, labels) = rows
            .into_iter()
            .map(|r| (layout.image_path(&dir, &r.id), r.grade))
            .unzip();
        Ok(SampleSet::new(paths, labels)?)
    }

    fn load_pseudo_labels(&self, name: &str, img_size: u32) -> Result<SampleSet> {
        let layout  = &self.catalog.test;
        let dir   = self.catalog.test_image_dir(img_size);
        let table = self.catalog.pseudo_label_table(name);
        let rows  = read_label_table(&table, &layout.id_column, &layout.grade_column)?;

        let (paths, labels) = rows
            .into_iter()
            .map(|r| (layout.image_path(&dir, &r.id), r.grade))
            .unzip();
        Ok(SampleSet::new(paths, labels)?)
    }

    /// Duplicate ids refer to APTOS images.
    fn load_duplicates(&self, img_size: u32) -> Result<HashSet<PathBuf>> {
        let ids  = read_duplicate_ids(&self.catalog.duplicate_table)?;
        let layout = self.catalog.source(SourceDataset::Aptos2019);
        let dir  = self.catalog.image_dir(SourceDataset::Aptos2019, img_size);
        Ok(ids.iter().map(|id| layout.image_path(&dir, id)).collect())
    }
}

/// Build the folds from already loaded sample sets.
///
/// `train_extra` is appended to the training side of every fold;
/// `duplicates` are removed from both sides.
pub fn compose_folds(
    primary:     &SampleSet,
    train_extra: &SampleSet,
    duplicates:  &HashSet<PathBuf>,
    n_splits:    usize,
    seed:        u64,
) -> Result<Vec<FoldSplit>, TrainError> {
    let folds = stratified_kfold(primary.labels(), n_splits, seed)?;

    let mut splits = Vec::with_capacity(folds.len());
    for (k, fold) in folds.iter().enumerate() {
        let mut train = primary.select(&fold.train);
        let mut valid = primary.select(&fold.valid);
        train.extend(train_extra);

        if !duplicates.is_empty() {
            let removed = train.remove_paths(duplicates) + valid.remove_paths(duplicates);
            tracing::debug!("Fold {}: removed {} duplicated images", k + 1, removed);
        }

        if valid.is_empty() {
            return Err(TrainError::integrity(format!(
                "fold {} has no validation images left after duplicate removal",
                k + 1
            )));
        }

        tracing::debug!("Fold {}: {} train / {} validation", k + 1, train.len(), valid.len());
        splits.push(FoldSplit::new(train, valid));
    }
    Ok(splits)
}
