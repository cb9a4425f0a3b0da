use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use std::path::Path;

/// Height that keeps the aspect ratio when an image of `width`x`height` is
/// scaled to `target_width`. Never collapses to zero.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height.max(1);
    }
    let h = (height as f64 * target_width as f64 / width as f64).round() as u32;
    h.max(1)
}

/// Scale `img` to exactly `target_width` pixels wide, keeping the aspect ratio.
pub fn resize_to_width(img: &DynamicImage, target_width: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    let target_width = target_width.max(1);
    if w == target_width {
        return img.clone();
    }
    let target_height = scaled_height(w, h, target_width);
    img.resize_exact(target_width, target_height, FilterType::Triangle)
}

/// Read `src`, scale it to `target_width` and write the result to `dst`.
/// The output format follows the extension of `dst`.
pub fn resize_file(src: &Path, target_width: u32, dst: &Path) -> Result<()> {
    let img = open(src)?;
    let resized = resize_to_width(&img, target_width);
    save(&resized, dst)
}

/// Image dimensions read from the file header, without decoding pixels.
pub fn dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).with_context(|| format!("reading size of {}", path.display()))
}

pub fn open(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("decoding {}", path.display()))
}

pub fn save(img: &DynamicImage, path: &Path) -> Result<()> {
    // JPEG has no alpha channel
    let img = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
        _ => img.clone(),
    };
    img.save(path)
        .with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_height_keeps_ratio() {
        assert_eq!(scaled_height(1600, 1200, 800), 600);
        assert_eq!(scaled_height(400, 300, 800), 600);
        assert_eq!(scaled_height(3000, 1, 800), 1);
    }

    #[test]
    fn test_resize_to_width() {
        let img = DynamicImage::new_rgb8(200, 100);
        let out = resize_to_width(&img, 50);
        assert_eq!(out.dimensions(), (50, 25));

        // enlarging is allowed, callers cap the width themselves
        let out = resize_to_width(&img, 400);
        assert_eq!(out.dimensions(), (400, 200));
    }

    #[test]
    fn test_resize_file_roundtrip() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("facesort-imaging-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        let src = dir.join("src.png");
        let dst = dir.join("dst.jpg");
        DynamicImage::new_rgba8(64, 32).save(&src)?;

        resize_file(&src, 16, &dst)?;
        assert_eq!(dimensions(&dst)?, (16, 8));

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn test_dimensions_rejects_non_image() -> Result<()> {
        let path = std::env::temp_dir().join(format!("facesort-not-image-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"hello")?;
        assert!(dimensions(&path).is_err());
        std::fs::remove_file(&path)?;
        Ok(())
    }
}
