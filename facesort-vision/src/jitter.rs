//! Training-time augmentation for face chips.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use rand::Rng;

/// Smallest share of the chip side kept by a random crop.
const MIN_CROP: f32 = 0.9;

/// A randomly cropped, rescaled and possibly mirrored copy of `img`, with the
/// same dimensions as the input.
pub fn jitter<R: Rng + ?Sized>(img: &DynamicImage, rng: &mut R) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 {
        return img.clone();
    }

    let keep = rng.gen_range(MIN_CROP..=1.0);
    let cw = ((w as f32 * keep) as u32).clamp(1, w);
    let ch = ((h as f32 * keep) as u32).clamp(1, h);
    let x = rng.gen_range(0..=w - cw);
    let y = rng.gen_range(0..=h - ch);

    let out = img
        .crop_imm(x, y, cw, ch)
        .resize_exact(w, h, FilterType::Triangle);
    if rng.gen_bool(0.5) {
        out.fliph()
    } else {
        out
    }
}
