//! Face extraction: downsize every person's photos and save the faces found
//! in them.
//!
//! For each `data/<prefix><name>` folder, every non-hidden photo is written
//! to `small/` at the configured width, then each face detected in that copy
//! is saved to `faces/<stem>_<index><ext>`. Work is strictly sequential and
//! the first error aborts the run.

use crate::backend::Context;
use crate::{fs_tools, walk};
use anyhow::{Context as _, Result};
use log::{error, info};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub persons: usize,
    pub images: usize,
    pub faces: usize,
}

/// `faces/` file name for face `index` of `photo`.
pub fn face_crop_name(photo: &Path, index: usize) -> String {
    let (stem, ext) = fs_tools::split_name(photo);
    format!("{}_{}{}", stem, index, ext)
}

pub fn run(ctx: &mut Context) -> Result<ExtractReport> {
    let result = extract_all(ctx);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn extract_all(ctx: &mut Context) -> Result<ExtractReport> {
    let root = ctx.config.data_dir.clone();
    let prefix = ctx.config.extract.person_prefix.clone();

    let mut report = ExtractReport::default();
    for dir in walk::prefixed_dirs(&root, &prefix) {
        let dir = dir?;
        extract_person(ctx, &dir, &mut report)?;
        report.persons += 1;
    }
    Ok(report)
}

fn extract_person(ctx: &mut Context, dir: &Path, report: &mut ExtractReport) -> Result<()> {
    info!("Extract faces from person: {}", dir.display());

    let small_dir = dir.join(&ctx.config.extract.small_dir);
    let faces_dir = dir.join(&ctx.config.extract.faces_dir);
    fs_tools::ensure_dir(&small_dir)?;
    fs_tools::ensure_dir(&faces_dir)?;

    for photo in walk::files(dir, false) {
        let photo = photo?;
        report.faces += extract_photo(ctx, &photo, &small_dir, &faces_dir)?;
        report.images += 1;
    }
    Ok(())
}

fn extract_photo(ctx: &mut Context, photo: &Path, small_dir: &Path, faces_dir: &Path) -> Result<usize> {
    info!("    Image: {}", photo.display());

    let name = photo
        .file_name()
        .with_context(|| format!("{} has no file name", photo.display()))?;
    let small: PathBuf = small_dir.join(name);
    ctx.imaging
        .resize_to_file(photo, ctx.config.extract.max_width, &small)
        .with_context(|| format!("resizing {}", photo.display()))?;
    info!("        Small: {}", small.display());

    let faces = ctx.detector.detect_faces(&small)?;
    for (i, face) in faces.iter().enumerate() {
        let face_path = faces_dir.join(face_crop_name(photo, i));
        ctx.imaging.save(face, &face_path)?;
        info!("        Face: {}", face_path.display());
    }
    Ok(faces.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_crop_name() {
        let photo = Path::new("data/p-shin/IMG_0042.JPG");
        assert_eq!(face_crop_name(photo, 0), "IMG_0042_0.JPG");
        assert_eq!(face_crop_name(photo, 12), "IMG_0042_12.JPG");
        assert_eq!(face_crop_name(Path::new("scan"), 1), "scan_1");
    }
}
