use burn::data::dataset::Dataset;
use rand::thread_rng;

use crate::data::augment::{to_chw, ImageTransform};
use crate::domain::sample::SampleSet;

/// One decoded, transformed image with its grade.
/// `pixels` is CHW with 3 channels of `size` × `size`.
#[derive(Debug, Clone)]
pub struct RetinaItem {
    pub pixels: Vec<f32>,
    pub size:   usize,
    pub label:  u8,
}

/// Reads fundus images lazily from disk.
///
/// Decoding happens in `get`. An unreadable image yields `None`,
/// which ends the loader's pass early; the epoch driver turns the
/// short pass into an error.
pub struct RetinaDataset {
    samples:   SampleSet,
    transform: ImageTransform,
}

impl RetinaDataset {
    pub fn new(samples: SampleSet, transform: ImageTransform) -> Self {
        Self { samples, transform }
    }
}

impl Dataset<RetinaItem> for RetinaDataset {
    fn get(&self, index: usize) -> Option<RetinaItem> {
        let (path, label) = self.samples.get(index)?;
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                tracing::error!("Cannot decode '{}': {e}", path.display());
                return None;
            }
        };
        let out = self.transform.apply(&img, &mut thread_rng());
        Some(RetinaItem {
            pixels: to_chw(&out),
            size:   self.transform.output_size() as usize,
            label,
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    #[test]
    fn test_get_decodes_and_transforms() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        RgbImage::from_pixel(20, 10, Rgb([10, 20, 30])).save(&path).unwrap();

        let samples = SampleSet::new(vec![path, PathBuf::from("missing.png")], vec![3, 1]).unwrap();
        let ds = RetinaDataset::new(samples, ImageTransform::Eval { input_size: 8 });

        assert_eq!(ds.len(), 2);
        let item = ds.get(0).unwrap();
        assert_eq!(item.label, 3);
        assert_eq!(item.size, 8);
        assert_eq!(item.pixels.len(), 3 * 8 * 8);
        assert!(ds.get(1).is_none());
        assert!(ds.get(2).is_none());
    }
}
