// ============================================================
// Layer 4 — Retina Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks RetinaItems into one
// image tensor and one grade tensor.
//
//   Input:  N items, each 3 × S × S floats
//   Output: images  [N, 3, S, S]
//           targets [N]          (Int grades)
//
// Every item of a loader comes from the same transform, so all
// share one side length S.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::RetinaItem;

#[derive(Debug, Clone)]
pub struct RetinaBatch<B: Backend> {
    /// Normalised images — shape: [batch_size, 3, size, size]
    pub images:  Tensor<B, 4>,
    /// Grades — shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Holds the device so tensors are created where the model lives.
#[derive(Clone, Debug)]
pub struct RetinaBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> RetinaBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<RetinaItem, RetinaBatch<B>> for RetinaBatcher<B> {
    fn batch(&self, items: Vec<RetinaItem>) -> RetinaBatch<B> {
        let batch_size = items.len();
        let size       = items.first().map_or(0, |it| it.size);

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|it| it.pixels.iter().copied())
            .collect();
        let grades: Vec<i32> = items.iter().map(|it| i32::from(it.label)).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, size, size]),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(grades, [batch_size]),
            &self.device,
        );

        RetinaBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes() {
        let items = (0..3)
            .map(|i| RetinaItem { pixels: vec![i as f32; 3 * 4 * 4], size: 4, label: i as u8 })
            .collect();
        let batcher = RetinaBatcher::<NdArray>::new(Default::default());
        let batch   = batcher.batch(items);

        assert_eq!(batch.images.dims(), [3, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [3]);
        let grades: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(grades, vec![0, 1, 2]);
    }
}
