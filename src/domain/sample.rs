// ============================================================
// Layer 3 — Sample Sets and Fold Splits
// ============================================================
// A SampleSet is two parallel sequences: image paths and grades.
// Grades are small non-negative integers (0 = no retinopathy,
// 4 = proliferative). Regression heads read them as floats.
//
// A FoldSplit pairs the train and validation SampleSets of one
// cross-validation fold.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::TrainError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    paths:  Vec<PathBuf>,
    labels: Vec<u8>,
}

impl SampleSet {
    /// Build a sample set, rejecting sequences of different length.
    pub fn new(paths: Vec<PathBuf>, labels: Vec<u8>) -> Result<Self, TrainError> {
        if paths.len() != labels.len() {
            return Err(TrainError::integrity(format!(
                "{} image paths but {} labels",
                paths.len(),
                labels.len()
            )));
        }
        Ok(Self { paths, labels })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn get(&self, index: usize) -> Option<(&Path, u8)> {
        Some((self.paths.get(index)?.as_path(), *self.labels.get(index)?))
    }

    /// Pick the given positions, in the order given.
    pub fn select(&self, indices: &[usize]) -> Self {
        let paths  = indices.iter().map(|&i| self.paths[i].clone()).collect();
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        Self { paths, labels }
    }

    /// Append every sample of `other` after the current ones.
    pub fn extend(&mut self, other: &SampleSet) {
        self.paths.extend(other.paths.iter().cloned());
        self.labels.extend_from_slice(&other.labels);
    }

    /// Drop every sample whose path is in `paths`. Returns how many were removed.
    pub fn remove_paths(&mut self, paths: &HashSet<PathBuf>) -> usize {
        let before = self.len();
        let (kept_paths, kept_labels): (Vec<_>, Vec<_>) = self
            .paths
            .drain(..)
            .zip(self.labels.drain(..))
            .filter(|(p, _)| !paths.contains(p))
            .unzip();
        self.paths  = kept_paths;
        self.labels = kept_labels;
        before - self.len()
    }

    /// Number of samples per grade, indexed by grade.
    pub fn class_counts(&self) -> Vec<usize> {
        let width = self.labels.iter().map(|&l| l as usize + 1).max().unwrap_or(0);
        let mut counts = vec![0; width];
        for &l in &self.labels {
            counts[l as usize] += 1;
        }
        counts
    }
}

/// Train and validation samples of a single fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSplit {
    pub train: SampleSet,
    pub valid: SampleSet,
}

impl FoldSplit {
    pub fn new(train: SampleSet, valid: SampleSet) -> Self {
        Self { train, valid }
    }

    /// The (train labels, validation labels) pair of this fold.
    pub fn labels(&self) -> (&[u8], &[u8]) {
        (self.train.labels(), self.valid.labels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(n: usize) -> SampleSet {
        let paths  = (0..n).map(|i| PathBuf::from(format!("img/{i}.png"))).collect();
        let labels = (0..n).map(|i| (i % 5) as u8).collect();
        SampleSet::new(paths, labels).unwrap()
    }

    #[test]
    fn test_length_mismatch_is_integrity_error() {
        let err = SampleSet::new(vec![PathBuf::from("a.png")], vec![]).unwrap_err();
        assert!(matches!(err, TrainError::DataIntegrity(_)));
    }

    #[test]
    fn test_select_keeps_pairs_aligned() {
        let s   = set(10);
        let sub = s.select(&[7, 2]);
        assert_eq!(sub.paths(), &[PathBuf::from("img/7.png"), PathBuf::from("img/2.png")]);
        assert_eq!(sub.labels(), &[2, 2]);
    }

    #[test]
    fn test_remove_paths() {
        let mut s = set(6);
        let dupes: HashSet<PathBuf> =
            [PathBuf::from("img/1.png"), PathBuf::from("img/4.png"), PathBuf::from("other.png")]
                .into_iter()
                .collect();
        assert_eq!(s.remove_paths(&dupes), 2);
        assert_eq!(s.len(), 4);
        assert_eq!(s.labels(), &[0, 2, 3, 0]);
    }

    #[test]
    fn test_class_counts() {
        let s = set(12);
        assert_eq!(s.class_counts(), vec![3, 3, 2, 2, 2]);
        assert!(SampleSet::default().class_counts().is_empty());
    }
}
