//! Recognizer training from the per-person face crops.

use crate::backend::Context;
use crate::walk;
use anyhow::{bail, Context as _, Result};
use log::{error, info};
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrainingReport {
    /// `(label, face count)` in training order.
    pub faces_per_person: Vec<(String, usize)>,
}

impl TrainingReport {
    pub fn total_faces(&self) -> usize {
        self.faces_per_person.iter().map(|(_, n)| n).sum()
    }
}

/// Train on every configured person, then overwrite the model file. Any
/// failure aborts before the model is written.
pub fn run(ctx: &mut Context) -> Result<TrainingReport> {
    let result = train(ctx);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn train(ctx: &mut Context) -> Result<TrainingReport> {
    ctx.recognizer.reset();

    let persons = ctx.config.training.persons.clone();
    let jitters = ctx.config.training.jitters;
    let mut report = TrainingReport::default();

    for person in &persons {
        info!("Process {}", person);
        let dir = ctx.config.faces_dir(person);
        let faces = load_faces(ctx, &dir)?;

        info!("    Add faces.");
        ctx.recognizer
            .add_faces(&faces, person, jitters)
            .with_context(|| format!("adding faces of {}", person))?;
        info!("    Faces added.");
        report.faces_per_person.push((person.clone(), faces.len()));
    }

    info!("Write model data...");
    let model = ctx.recognizer.serialize()?;
    let path = &ctx.config.model_path;
    std::fs::write(path, serde_json::to_vec(&model)?)
        .with_context(|| format!("writing model {}", path.display()))?;
    info!("Model data written.");

    Ok(report)
}

/// Every non-hidden file of `dir` as an image. A missing folder has no faces;
/// anything other than a readable folder in its place is an error.
fn load_faces(ctx: &Context, dir: &Path) -> Result<Vec<image::DynamicImage>> {
    match fs::symlink_metadata(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("    No face folder {}", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).with_context(|| format!("reading face folder {}", dir.display())),
        Ok(_) => {}
    }
    let meta =
        fs::metadata(dir).with_context(|| format!("reading face folder {}", dir.display()))?;
    if !meta.is_dir() {
        bail!("face folder {} is not a directory", dir.display());
    }

    let mut faces = Vec::new();
    for path in walk::files(dir, false) {
        let path = path?;
        info!("    Load face {}.", path.display());
        faces.push(ctx.imaging.open(&path)?);
    }
    Ok(faces)
}
