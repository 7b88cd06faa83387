// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from label tables on disk to tensor batches.
//
//   label tables (CSV)
//       │
//       ▼
//   DatasetComposer   → one FoldSplit per fold (stratified k-fold,
//       │               secondary datasets, pseudo labels, duplicates)
//       ▼
//   RetinaDataset     → decodes an image and applies ImageTransform
//       │
//       ▼
//   RetinaBatcher     → stacks items into [N, 3, S, S] tensors
//       │
//       ▼
//   DataLoader        → feeds batches to the epoch driver

/// Where each dataset's tables and images live
pub mod catalog;

/// CSV readers for label, duplicate and pseudo-label tables
pub mod tables;

/// Seeded stratified k-fold partitioning
pub mod splitter;

/// Builds the per-fold train/validation sample sets
pub mod composer;

/// Training and evaluation image transforms
pub mod augment;

/// Implements Burn's Dataset trait over image files
pub mod dataset;

/// Implements Burn's Batcher trait for image batches
pub mod batcher;
