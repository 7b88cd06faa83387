// ============================================================
// Layer 4 — Stratified K-Fold Splitter
// ============================================================
// Partitions sample positions into k folds so that every fold's
// validation part keeps the grade distribution of the whole set.
//
// How the deal works:
//   1. Group positions by grade (ascending grade order)
//   2. Shuffle each group with a ChaCha8 RNG seeded from `seed`
//   3. Deal members round-robin across the k folds, with one
//      cursor that keeps running from one grade to the next
//
// Because the cursor never resets, fold sizes differ by at most
// one, and a grade with at least k members lands in every fold.
//
// The same labels and seed always give the same folds.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::domain::error::TrainError;

/// Positions of one fold, both lists sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldIndices {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Split positions `0..labels.len()` into `n_splits` stratified folds.
pub fn stratified_kfold(
    labels:   &[u8],
    n_splits: usize,
    seed:     u64,
) -> Result<Vec<FoldIndices>, TrainError> {
    if n_splits < 2 {
        return Err(TrainError::config(format!(
            "cross-validation needs at least 2 folds, got {n_splits}"
        )));
    }
    if n_splits > labels.len() {
        return Err(TrainError::config(format!(
            "cannot split {} samples into {n_splits} folds",
            labels.len()
        )));
    }

    let mut by_grade: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_grade.entry(label).or_default().push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; labels.len()];
    let mut cursor  = 0usize;

    for members in by_grade.values_mut() {
        members.shuffle(&mut rng);
        for &i in members.iter() {
            fold_of[i] = cursor % n_splits;
            cursor += 1;
        }
    }

    let folds = (0..n_splits)
        .map(|k| {
            let (valid, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == k);
            FoldIndices { train, valid }
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        "Stratified {}-fold split of {} samples: validation sizes {:?}",
        n_splits,
        labels.len(),
        folds.iter().map(|f| f.valid.len()).collect::<Vec<_>>()
    );

    Ok(folds)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn skewed_labels(n: usize) -> Vec<u8> {
        // roughly 50% grade 0, 10% grade 1, 25% grade 2, 5% grade 3, 10% grade 4
        (0..n)
            .map(|i| match i % 20 {
                0..=9   => 0,
                10..=11 => 1,
                12..=16 => 2,
                17      => 3,
                _       => 4,
            })
            .collect()
    }

    #[test]
    fn test_thousand_samples_five_folds() {
        let labels = skewed_labels(1000);
        let folds  = stratified_kfold(&labels, 5, 41).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen = HashSet::new();
        for fold in &folds {
            assert_eq!(fold.valid.len(), 200);
            assert_eq!(fold.train.len(), 800);
            let valid: HashSet<_> = fold.valid.iter().collect();
            assert!(fold.train.iter().all(|i| !valid.contains(i)));
            for &i in &fold.valid {
                assert!(seen.insert(i), "position {i} validated twice");
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_every_grade_in_every_validation_fold() {
        let labels = skewed_labels(200);
        for fold in stratified_kfold(&labels, 5, 7).unwrap() {
            let grades: HashSet<u8> = fold.valid.iter().map(|&i| labels[i]).collect();
            assert_eq!(grades.len(), 5);
            // grade 0 is half of the data, so half of each fold
            let zeros = fold.valid.iter().filter(|&&i| labels[i] == 0).count();
            assert_eq!(zeros, 20);
        }
    }

    #[test]
    fn test_same_seed_same_folds() {
        let labels = skewed_labels(333);
        assert_eq!(
            stratified_kfold(&labels, 4, 41).unwrap(),
            stratified_kfold(&labels, 4, 41).unwrap()
        );
        assert_ne!(
            stratified_kfold(&labels, 4, 41).unwrap(),
            stratified_kfold(&labels, 4, 42).unwrap()
        );
    }

    #[test]
    fn test_fold_sizes_differ_by_at_most_one() {
        let labels = skewed_labels(101);
        let sizes: Vec<usize> = stratified_kfold(&labels, 3, 1)
            .unwrap()
            .iter()
            .map(|f| f.valid.len())
            .collect();
        let min = *sizes.iter().min().unwrap();
        let max = *sizes.iter().max().unwrap();
        assert!(max - min <= 1);
        assert_eq!(sizes.iter().sum::<usize>(), 101);
    }

    #[test]
    fn test_invalid_fold_counts() {
        let labels = skewed_labels(10);
        assert!(matches!(stratified_kfold(&labels, 1, 0), Err(TrainError::Configuration(_))));
        assert!(matches!(stratified_kfold(&labels, 11, 0), Err(TrainError::Configuration(_))));
    }
}
