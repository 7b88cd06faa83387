// ============================================================
// Layer 4 — Image Augmentation
// ============================================================
// Per-sample transform applied before batching.
//
// Training pipeline (each step can be switched off):
//   resize to img_size
//   → one random affine warp about the center: rotation, rescale,
//     horizontal shear and translation, black outside the source
//   → center crop to input_size
//   → random horizontal / vertical flip (p = 0.5 each)
//   → random contrast around the mean luminance
//   → random erasing of one rectangle
//
// Evaluation pipeline: resize straight to input_size.
//
// Both end with to_chw(): RGB → [3, H, W] floats normalised with
// the ImageNet channel mean and standard deviation.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::error::TrainError;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentConfig {
    pub rotate:            bool,
    /// Rotation range in degrees
    pub rotate_min:        f64,
    pub rotate_max:        f64,
    pub rescale:           bool,
    pub rescale_min:       f64,
    pub rescale_max:       f64,
    pub shear:             bool,
    /// Horizontal shear range in degrees
    pub shear_min:         f64,
    pub shear_max:         f64,
    pub translate:         bool,
    /// Largest horizontal shift, as a fraction of the width
    pub translate_min:     f64,
    /// Largest vertical shift, as a fraction of the height
    pub translate_max:     f64,
    pub flip:              bool,
    pub contrast:          bool,
    pub contrast_min:      f64,
    pub contrast_max:      f64,
    pub random_erase:      bool,
    pub random_erase_prob: f64,
    /// Smallest erased area, as a fraction of the image
    pub random_erase_sl:   f64,
    /// Largest erased area, as a fraction of the image
    pub random_erase_sh:   f64,
    /// Smallest aspect ratio of the erased rectangle (largest is 1/r)
    pub random_erase_r:    f64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            rotate:            true,
            rotate_min:        -180.0,
            rotate_max:        180.0,
            rescale:           true,
            rescale_min:       0.8889,
            rescale_max:       1.0,
            shear:             true,
            shear_min:         -36.0,
            shear_max:         36.0,
            translate:         false,
            translate_min:     0.0,
            translate_max:     0.0,
            flip:              true,
            contrast:          true,
            contrast_min:      0.9,
            contrast_max:      1.1,
            random_erase:      false,
            random_erase_prob: 0.5,
            random_erase_sl:   0.02,
            random_erase_sh:   0.4,
            random_erase_r:    0.3,
        }
    }
}

impl AugmentConfig {
    pub fn validate(&self) -> Result<(), TrainError> {
        let range = |name: &str, lo: f64, hi: f64| {
            if lo.is_finite() && hi.is_finite() && lo > 0.0 && lo <= hi {
                Ok(())
            } else {
                Err(TrainError::config(format!("{name} range {lo}..{hi} is invalid")))
            }
        };
        range("rescale", self.rescale_min, self.rescale_max)?;
        range("contrast", self.contrast_min, self.contrast_max)?;
        range("random_erase area", self.random_erase_sl, self.random_erase_sh)?;
        if !(0.0..=1.0).contains(&self.random_erase_prob) {
            return Err(TrainError::config("random_erase_prob must be within 0..=1"));
        }
        if self.rescale_max > 1.0 || self.random_erase_sh > 1.0 {
            return Err(TrainError::config("rescale and erase fractions must not exceed 1"));
        }
        if !(self.random_erase_r > 0.0 && self.random_erase_r <= 1.0) {
            return Err(TrainError::config("random_erase_r must be within (0, 1]"));
        }
        if !(self.rotate_min <= self.rotate_max) {
            return Err(TrainError::config(format!(
                "rotate range {}..{} is invalid",
                self.rotate_min, self.rotate_max
            )));
        }
        if !(self.shear_min <= self.shear_max && self.shear_min > -90.0 && self.shear_max < 90.0) {
            return Err(TrainError::config(format!(
                "shear range {}..{} must lie within -90..90 degrees",
                self.shear_min, self.shear_max
            )));
        }
        for t in [self.translate_min, self.translate_max] {
            if !(0.0..=1.0).contains(&t) {
                return Err(TrainError::config(format!("translate fraction {t} must be within 0..=1")));
            }
        }
        Ok(())
    }
}

/// Transform producing the network input for one image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageTransform {
    Train { img_size: u32, input_size: u32, aug: AugmentConfig },
    Eval  { input_size: u32 },
}

impl ImageTransform {
    /// Side length of the square image this transform produces.
    pub fn output_size(&self) -> u32 {
        match self {
            Self::Train { input_size, .. } | Self::Eval { input_size } => *input_size,
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: &DynamicImage, rng: &mut R) -> RgbImage {
        match self {
            Self::Eval { input_size } => img
                .resize_exact(*input_size, *input_size, FilterType::Triangle)
                .to_rgb8(),
            Self::Train { img_size, input_size, aug } => {
                let mut out = img.resize_exact(*img_size, *img_size, FilterType::Triangle).to_rgb8();
                let warp = Affine::sample(aug, out.dimensions(), rng);
                if !warp.is_identity() {
                    out = warp.apply(&out);
                }
                out = center_crop(&out, *input_size);
                if aug.flip && rng.gen_bool(0.5) {
                    imageops::flip_horizontal_in_place(&mut out);
                }
                if aug.flip && rng.gen_bool(0.5) {
                    imageops::flip_vertical_in_place(&mut out);
                }
                if aug.contrast {
                    let factor = rng.gen_range(aug.contrast_min..=aug.contrast_max);
                    adjust_contrast(&mut out, factor as f32);
                }
                if aug.random_erase && rng.gen_bool(aug.random_erase_prob) {
                    random_erase(&mut out, aug, rng);
                }
                out
            }
        }
    }
}

/// RGB image → normalised CHW floats.
pub fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let plane  = (w * h) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (x, y, px) in img.enumerate_pixels() {
        let i = (y * w + x) as usize;
        for c in 0..3 {
            out[c * plane + i] = (f32::from(px[c]) / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    out
}

/// Random affine parameters, drawn once per image.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    angle: f64,
    scale: f64,
    shear: f64,
    tx:    f64,
    ty:    f64,
}

impl Affine {
    const IDENTITY: Self = Self { angle: 0.0, scale: 1.0, shear: 0.0, tx: 0.0, ty: 0.0 };

    fn sample<R: Rng + ?Sized>(aug: &AugmentConfig, (w, h): (u32, u32), rng: &mut R) -> Self {
        let mut a = Self::IDENTITY;
        if aug.rotate {
            a.angle = rng.gen_range(aug.rotate_min..=aug.rotate_max).to_radians();
        }
        if aug.rescale {
            a.scale = rng.gen_range(aug.rescale_min..=aug.rescale_max);
        }
        if aug.shear {
            a.shear = rng.gen_range(aug.shear_min..=aug.shear_max).to_radians();
        }
        if aug.translate {
            let max_dx = aug.translate_min * f64::from(w);
            let max_dy = aug.translate_max * f64::from(h);
            a.tx = rng.gen_range(-max_dx..=max_dx).round();
            a.ty = rng.gen_range(-max_dy..=max_dy).round();
        }
        a
    }

    fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Forward matrix: scale · rotation · shear.
    fn matrix(&self) -> [f64; 4] {
        let (sin, cos) = self.angle.sin_cos();
        let k = self.shear.tan();
        let s = self.scale;
        [s * cos, s * (cos * k - sin), s * sin, s * (sin * k + cos)]
    }

    /// Warp about the image center with nearest-neighbour sampling.
    fn apply(&self, img: &RgbImage) -> RgbImage {
        let (w, h) = img.dimensions();
        let [a, b, c, d] = self.matrix();
        let det = a * d - b * c;
        if det.abs() < 1e-12 {
            return RgbImage::new(w, h);
        }
        let (inv_a, inv_b, inv_c, inv_d) = (d / det, -b / det, -c / det, a / det);
        let cx = f64::from(w) * 0.5;
        let cy = f64::from(h) * 0.5;

        RgbImage::from_fn(w, h, |x, y| {
            let dx = f64::from(x) + 0.5 - cx - self.tx;
            let dy = f64::from(y) + 0.5 - cy - self.ty;
            let sx = (inv_a * dx + inv_b * dy + cx).floor();
            let sy = (inv_c * dx + inv_d * dy + cy).floor();
            if sx >= 0.0 && sy >= 0.0 && sx < f64::from(w) && sy < f64::from(h) {
                *img.get_pixel(sx as u32, sy as u32)
            } else {
                Rgb([0, 0, 0])
            }
        })
    }
}

fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w < size || h < size {
        return imageops::resize(img, size, size, FilterType::Triangle);
    }
    imageops::crop_imm(img, (w - size) / 2, (h - size) / 2, size, size).to_image()
}

fn adjust_contrast(img: &mut RgbImage, factor: f32) {
    let count = img.pixels().len().max(1) as f32;
    let mean = img
        .pixels()
        .map(|p| 0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]))
        .sum::<f32>()
        / count;
    for px in img.pixels_mut() {
        for c in 0..3 {
            px[c] = ((f32::from(px[c]) - mean) * factor + mean).round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn random_erase<R: Rng + ?Sized>(img: &mut RgbImage, aug: &AugmentConfig, rng: &mut R) {
    let (w, h) = img.dimensions();
    let area   = f64::from(w) * f64::from(h);
    for _ in 0..10 {
        let target = area * rng.gen_range(aug.random_erase_sl..=aug.random_erase_sh);
        let aspect = rng.gen_range(aug.random_erase_r..=1.0 / aug.random_erase_r);
        let eh = (target * aspect).sqrt().round() as u32;
        let ew = (target / aspect).sqrt().round() as u32;
        if eh == 0 || ew == 0 || eh >= h || ew >= w {
            continue;
        }
        let x0 = rng.gen_range(0..w - ew);
        let y0 = rng.gen_range(0..h - eh);
        for y in y0..y0 + eh {
            for x in x0..x0 + ew {
                img.put_pixel(x, y, Rgb([rng.gen(), rng.gen(), rng.gen()]));
            }
        }
        return;
    }
}
