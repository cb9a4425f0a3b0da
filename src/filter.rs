//! Photo filter: sort a folder of photos into buckets by who is in them.
//!
//! Every non-hidden file under the source is downsized to a private temporary
//! file, its faces are detected and each face is matched against the trained
//! model. The photo then moves into exactly one bucket:
//!
//! - no face, or no prediction within the quality threshold: `unrecognized`
//! - a surviving prediction carries the target label: `target`
//! - otherwise: `known`
//! - anything failing on the way: `failed`, and the run goes on.

use crate::backend::Context;
use crate::config::Config;
use crate::{fs_tools, walk};
use anyhow::{Context as _, Result};
use facesort_vision::Prediction;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Target,
    Known,
    Unrecognized,
    Failed,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Target,
        Bucket::Known,
        Bucket::Unrecognized,
        Bucket::Failed,
    ];
}

/// Destination folders of one filter run.
#[derive(Debug, Clone)]
pub struct Buckets {
    target: PathBuf,
    known: PathBuf,
    unrecognized: PathBuf,
    failed: PathBuf,
}

impl Buckets {
    pub fn new(dst: &Path, cfg: &Config) -> Self {
        let names = &cfg.filter.buckets;
        Self {
            target: dst.join(&names.target),
            known: dst.join(&names.known),
            unrecognized: dst.join(&names.unrecognized),
            failed: dst.join(&names.failed),
        }
    }

    pub fn dir(&self, bucket: Bucket) -> &Path {
        match bucket {
            Bucket::Target => &self.target,
            Bucket::Known => &self.known,
            Bucket::Unrecognized => &self.unrecognized,
            Bucket::Failed => &self.failed,
        }
    }

    pub fn create(&self) -> Result<()> {
        for bucket in Bucket::ALL {
            fs_tools::ensure_dir(self.dir(bucket))?;
        }
        Ok(())
    }
}

/// Photos moved per bucket.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub moved: BTreeMap<Bucket, usize>,
    /// Photos that could not even be moved into `failed`.
    pub stuck: usize,
}

impl FilterReport {
    pub fn count(&self, bucket: Bucket) -> usize {
        self.moved.get(&bucket).copied().unwrap_or(0)
    }
}

/// Bucket for a photo given one prediction per detected face.
pub fn route(predictions: &[Prediction], quality: f32, target_label: &str) -> Bucket {
    let mut matches = predictions.iter().filter(|p| p.distance <= quality).peekable();
    if matches.peek().is_none() {
        return Bucket::Unrecognized;
    }
    if matches.any(|p| p.class_name == target_label) {
        Bucket::Target
    } else {
        Bucket::Known
    }
}

/// Create the buckets, load the model, and sort every photo under `src`.
pub fn run(ctx: &mut Context, src: &Path, dst: &Path) -> Result<FilterReport> {
    let result = filter(ctx, src, dst);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn filter(ctx: &mut Context, src: &Path, dst: &Path) -> Result<FilterReport> {
    info!("Init directories...");
    let buckets = Buckets::new(dst, &ctx.config);
    buckets.create()?;
    fs_tools::ensure_dir(&ctx.config.temp_dir())?;

    info!("Load model...");
    let model_path = ctx.config.model_path.clone();
    let raw = std::fs::read(&model_path)
        .with_context(|| format!("reading model {}", model_path.display()))?;
    let model: serde_json::Value = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing model {}", model_path.display()))?;
    ctx.recognizer.load(model)?;
    info!("Model loaded.");

    // Snapshot first: photos are moved while we go, possibly below `src`.
    let src = src
        .canonicalize()
        .with_context(|| format!("resolving source {}", src.display()))?;
    let dst_root = dst
        .canonicalize()
        .with_context(|| format!("resolving destination {}", dst.display()))?;
    let mut photos = Vec::new();
    for photo in walk::files(&src, true) {
        let photo = photo?;
        if !photo.starts_with(&dst_root) {
            photos.push(photo);
        }
    }

    let mut report = FilterReport::default();
    for photo in &photos {
        info!("Process {}", photo.display());
        let bucket = match classify(ctx, photo) {
            Ok(bucket) => bucket,
            Err(e) => {
                error!("    FAILED!");
                error!("{:#}", e);
                Bucket::Failed
            }
        };
        match place(photo, bucket, &buckets) {
            Some(bucket) => *report.moved.entry(bucket).or_default() += 1,
            None => report.stuck += 1,
        }
    }
    Ok(report)
}

/// Move `photo` into its bucket, falling back to `failed`. Returns the bucket
/// it ended up in, or `None` when it stayed where it was.
fn place(photo: &Path, bucket: Bucket, buckets: &Buckets) -> Option<Bucket> {
    let mut attempt = bucket;
    loop {
        let dir = buckets.dir(attempt);
        info!("    Move to {}...", dir.display());
        match fs_tools::move_into(photo, dir) {
            Ok(_) => return Some(attempt),
            Err(e) if attempt != Bucket::Failed => {
                error!("    FAILED!");
                error!("{:#}", e);
                attempt = Bucket::Failed;
            }
            Err(e) => {
                error!("    cannot move {}: {:#}", photo.display(), e);
                return None;
            }
        }
    }
}

fn temp_path(cfg: &Config, photo: &Path) -> PathBuf {
    let (_, ext) = fs_tools::split_name(photo);
    cfg.temp_dir()
        .join(format!("facesort-{}{}", Uuid::new_v4(), ext))
}

fn classify(ctx: &mut Context, photo: &Path) -> Result<Bucket> {
    let max_width = ctx.config.filter.max_width;
    let width = match ctx.imaging.dimensions(photo) {
        Ok((w, _)) => w.min(max_width),
        Err(_) => {
            info!("    May not be an image?");
            max_width
        }
    };

    let tmp = temp_path(&ctx.config, photo);
    let result = detect_and_route(ctx, photo, width, &tmp);
    if tmp.exists() {
        if let Err(e) = std::fs::remove_file(&tmp) {
            warn!("    could not remove {}: {}", tmp.display(), e);
        }
    }
    result
}

fn detect_and_route(ctx: &mut Context, photo: &Path, width: u32, tmp: &Path) -> Result<Bucket> {
    ctx.imaging
        .resize_to_file(photo, width, tmp)
        .with_context(|| format!("resizing {}", photo.display()))?;

    let faces = ctx.detector.detect_faces(tmp)?;
    if faces.is_empty() {
        return Ok(Bucket::Unrecognized);
    }

    let predictions = faces
        .iter()
        .map(|face| ctx.recognizer.predict_best(face))
        .collect::<Result<Vec<_>>>()?;
    info!("\n{}\n", serde_json::to_string_pretty(&predictions)?);

    let f = &ctx.config.filter;
    Ok(route(&predictions, f.quality, &f.target_label))
}
