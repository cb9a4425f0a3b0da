//! Face recognition: SFace descriptors matched against a labeled gallery.
//!
//! The gallery keeps every training descriptor per label. A probe is scored
//! against a label by the mean Euclidean distance to that label's
//! descriptors; lower is a better match.
//!
//! Distances are rescaled so that SFace's same-identity L2 cut-off
//! ([`SFACE_MATCH_L2`]) lands on [`MATCH_DISTANCE`]. A quality threshold of 0.7
//! therefore means "confident match" as it does for 128-d dlib descriptors.

use crate::{jitter, model};
use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const SFACE_INPUT_SIZE: u32 = 112;

/// L2 distance between normalised SFace descriptors below which two faces
/// are the same person.
pub const SFACE_MATCH_L2: f32 = 1.128;

/// Reported distance of a probe sitting exactly on [`SFACE_MATCH_L2`].
pub const MATCH_DISTANCE: f32 = 0.7;

const DISTANCE_SCALE: f32 = MATCH_DISTANCE / SFACE_MATCH_L2;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer has no trained faces")]
    EmptyModel,
    #[error("descriptor has {got} dimensions, model uses {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("invalid model data: {0}")]
    InvalidModel(#[from] serde_json::Error),
}

/// All descriptors registered under one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceClass {
    pub class_name: String,
    pub face_descriptors: Vec<Vec<f32>>,
}

/// Best label for a probe face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub class_name: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gallery {
    classes: Vec<FaceClass>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classes(&self) -> &[FaceClass] {
        &self.classes
    }

    pub fn is_empty(&self) -> bool {
        self.classes.iter().all(|c| c.face_descriptors.is_empty())
    }

    pub fn clear(&mut self) {
        self.classes.clear();
    }

    /// Register descriptors under `label`, appending to an existing class.
    /// An empty batch registers nothing.
    pub fn add(&mut self, label: &str, descriptors: Vec<Vec<f32>>) {
        if descriptors.is_empty() {
            return;
        }
        match self.classes.iter_mut().find(|c| c.class_name == label) {
            Some(class) => class.face_descriptors.extend(descriptors),
            None => self.classes.push(FaceClass {
                class_name: label.to_string(),
                face_descriptors: descriptors,
            }),
        }
    }

    /// Calibrated mean distance from `probe` to every non-empty class, in
    /// class order.
    pub fn predict(&self, probe: &[f32]) -> Result<Vec<Prediction>, RecognizerError> {
        let mut out = Vec::with_capacity(self.classes.len());
        for class in self.classes.iter().filter(|c| !c.face_descriptors.is_empty()) {
            let mut total = 0.0;
            for d in &class.face_descriptors {
                if d.len() != probe.len() {
                    return Err(RecognizerError::DimensionMismatch {
                        expected: d.len(),
                        got: probe.len(),
                    });
                }
                total += euclidean_distance(d, probe);
            }
            out.push(Prediction {
                class_name: class.class_name.clone(),
                distance: total / class.face_descriptors.len() as f32 * DISTANCE_SCALE,
            });
        }
        Ok(out)
    }

    /// The class with the smallest mean distance to `probe`.
    pub fn predict_best(&self, probe: &[f32]) -> Result<Prediction, RecognizerError> {
        self.predict(probe)?
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .ok_or(RecognizerError::EmptyModel)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.classes)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, RecognizerError> {
        Ok(serde_json::from_value(value)?)
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Normalised element-wise mean of equally sized descriptors.
pub fn mean_descriptor(descriptors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = descriptors.first() else {
        return Vec::new();
    };
    let mut sum = vec![0.0f32; first.len()];
    for d in descriptors {
        for (s, x) in sum.iter_mut().zip(d) {
            *s += x;
        }
    }
    let n = descriptors.len() as f32;
    l2_normalize(sum.into_iter().map(|s| s / n).collect())
}

/// SFace encoder plus the gallery it is trained into.
pub struct FaceRecognizer {
    session: Session,
    gallery: Gallery,
    rng: StdRng,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: model::recog_session(model_path)?,
            gallery: Gallery::new(),
            rng: StdRng::from_entropy(),
        })
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// L2-normalised descriptor of one face chip.
    pub fn descriptor(&mut self, face: &DynamicImage) -> Result<Vec<f32>> {
        let size = SFACE_INPUT_SIZE;
        let rgb = face
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        // BGR, NCHW, raw 0..255
        let side = size as usize;
        let mut input = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, px) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = px[2] as f32;
            input[[0, 1, y, x]] = px[1] as f32;
            input[[0, 2, y, x]] = px[0] as f32;
        }

        let input_tensor = Value::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .context("running recognizer")?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(l2_normalize(data.to_vec()))
    }

    /// Descriptor averaged over `jitters` augmented copies; plain when
    /// `jitters <= 1`.
    pub fn jittered_descriptor(&mut self, face: &DynamicImage, jitters: u32) -> Result<Vec<f32>> {
        if jitters <= 1 {
            return self.descriptor(face);
        }
        let mut descriptors = Vec::with_capacity(jitters as usize);
        for _ in 0..jitters {
            let copy = jitter::jitter(face, &mut self.rng);
            descriptors.push(self.descriptor(&copy)?);
        }
        Ok(mean_descriptor(&descriptors))
    }

    pub fn add_faces(&mut self, faces: &[DynamicImage], label: &str, jitters: u32) -> Result<()> {
        let mut descriptors = Vec::with_capacity(faces.len());
        for face in faces {
            descriptors.push(self.jittered_descriptor(face, jitters)?);
        }
        self.gallery.add(label, descriptors);
        Ok(())
    }

    pub fn predict_best(&mut self, face: &DynamicImage) -> Result<Prediction> {
        if self.gallery.is_empty() {
            return Err(RecognizerError::EmptyModel.into());
        }
        let probe = self.descriptor(face)?;
        Ok(self.gallery.predict_best(&probe)?)
    }

    pub fn serialize(&self) -> serde_json::Value {
        self.gallery.to_json()
    }

    /// Replace the gallery with previously serialized model data.
    pub fn load_model(&mut self, data: serde_json::Value) -> Result<()> {
        self.gallery = Gallery::from_json(data)?;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.gallery.clear();
    }
}
