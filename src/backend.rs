//! Seams between the pipelines and the imaging / face libraries.

use crate::config::Config;
use crate::selector::Task;
use anyhow::{bail, Context as _, Result};
use facesort_vision::{imaging, Prediction};
use image::DynamicImage;
use log::info;
use std::path::Path;

pub trait Imaging {
    /// Scale `src` to `width` pixels wide, keeping the aspect ratio, and
    /// write it to `dst`.
    fn resize_to_file(&self, src: &Path, width: u32, dst: &Path) -> Result<()>;
    /// `(width, height)`; fails on anything that is not a readable image.
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)>;
    fn open(&self, path: &Path) -> Result<DynamicImage>;
    fn save(&self, img: &DynamicImage, path: &Path) -> Result<()>;
}

pub trait FaceDetector {
    /// One face image per detected face, possibly none.
    fn detect_faces(&mut self, image: &Path) -> Result<Vec<DynamicImage>>;
}

pub trait FaceRecognizer {
    fn add_faces(&mut self, faces: &[DynamicImage], label: &str, jitters: u32) -> Result<()>;
    fn predict_best(&mut self, face: &DynamicImage) -> Result<Prediction>;
    fn serialize(&self) -> Result<serde_json::Value>;
    fn load(&mut self, data: serde_json::Value) -> Result<()>;
    /// Forget everything added or loaded so far.
    fn reset(&mut self);
}

/// `image`-crate backed resizing and file I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrate;

impl Imaging for ImageCrate {
    fn resize_to_file(&self, src: &Path, width: u32, dst: &Path) -> Result<()> {
        imaging::resize_file(src, width, dst)
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        imaging::dimensions(path)
    }

    fn open(&self, path: &Path) -> Result<DynamicImage> {
        imaging::open(path)
    }

    fn save(&self, img: &DynamicImage, path: &Path) -> Result<()> {
        imaging::save(img, path)
    }
}

impl FaceDetector for facesort_vision::FaceDetector {
    fn detect_faces(&mut self, image: &Path) -> Result<Vec<DynamicImage>> {
        let img = imaging::open(image)?;
        facesort_vision::FaceDetector::detect_faces(self, &img)
            .with_context(|| format!("detecting faces in {}", image.display()))
    }
}

impl FaceRecognizer for facesort_vision::FaceRecognizer {
    fn add_faces(&mut self, faces: &[DynamicImage], label: &str, jitters: u32) -> Result<()> {
        facesort_vision::FaceRecognizer::add_faces(self, faces, label, jitters)
    }

    fn predict_best(&mut self, face: &DynamicImage) -> Result<Prediction> {
        facesort_vision::FaceRecognizer::predict_best(self, face)
    }

    fn serialize(&self) -> Result<serde_json::Value> {
        Ok(facesort_vision::FaceRecognizer::serialize(self))
    }

    fn load(&mut self, data: serde_json::Value) -> Result<()> {
        self.load_model(data)
    }

    fn reset(&mut self) {
        facesort_vision::FaceRecognizer::reset(self)
    }
}

/// Stand-in for a model the current task never touches.
#[derive(Debug, Clone, Copy)]
struct Unloaded(Task);

impl FaceDetector for Unloaded {
    fn detect_faces(&mut self, _image: &Path) -> Result<Vec<DynamicImage>> {
        bail!("face detector is not loaded for {}", self.0.name())
    }
}

impl FaceRecognizer for Unloaded {
    fn add_faces(&mut self, _faces: &[DynamicImage], _label: &str, _jitters: u32) -> Result<()> {
        bail!("face recognizer is not loaded for {}", self.0.name())
    }

    fn predict_best(&mut self, _face: &DynamicImage) -> Result<Prediction> {
        bail!("face recognizer is not loaded for {}", self.0.name())
    }

    fn serialize(&self) -> Result<serde_json::Value> {
        bail!("face recognizer is not loaded for {}", self.0.name())
    }

    fn load(&mut self, _data: serde_json::Value) -> Result<()> {
        bail!("face recognizer is not loaded for {}", self.0.name())
    }

    fn reset(&mut self) {}
}

/// Everything one pipeline run works with. Built once per invocation and
/// handed to the stage entry point.
pub struct Context {
    pub config: Config,
    pub imaging: Box<dyn Imaging>,
    pub detector: Box<dyn FaceDetector>,
    pub recognizer: Box<dyn FaceRecognizer>,
}

impl Context {
    pub fn new(
        config: Config,
        imaging: Box<dyn Imaging>,
        detector: Box<dyn FaceDetector>,
        recognizer: Box<dyn FaceRecognizer>,
    ) -> Self {
        Self {
            config,
            imaging,
            detector,
            recognizer,
        }
    }

    /// Context for `task`, backed by the ONNX models named in
    /// `config.vision`. Only the models the task uses are loaded.
    pub fn load(config: Config, task: Task) -> Result<Self> {
        let v = &config.vision;

        let detector: Box<dyn FaceDetector> = if task.needs_detector() {
            info!("Loading detector {}", v.detector_model.display());
            Box::new(
                facesort_vision::FaceDetector::load(
                    &v.detector_model,
                    v.score_threshold,
                    v.nms_threshold,
                    v.face_size,
                )
                .context("Failed to initialize face detector")?,
            )
        } else {
            Box::new(Unloaded(task))
        };

        let recognizer: Box<dyn FaceRecognizer> = if task.needs_recognizer() {
            info!("Loading recognizer {}", v.recognizer_model.display());
            Box::new(
                facesort_vision::FaceRecognizer::load(&v.recognizer_model)
                    .context("Failed to initialize face recognizer")?,
            )
        } else {
            Box::new(Unloaded(task))
        };

        Ok(Self::new(config, Box::new(ImageCrate), detector, recognizer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn missing_models() -> Config {
        let dir = std::env::temp_dir().join(format!("facesort-no-models-{}", uuid::Uuid::new_v4()));
        let mut cfg = Config::default();
        cfg.vision.detector_model = dir.join("yunet.onnx");
        cfg.vision.recognizer_model = dir.join("sface.onnx");
        cfg
    }

    fn load_error(task: Task) -> String {
        match Context::load(missing_models(), task) {
            Ok(_) => panic!("{} loaded without model files", task.name()),
            Err(e) => format!("{:#}", e),
        }
    }

    #[test]
    fn test_stage_models() {
        assert!(Task::ExtractFaces.needs_detector());
        assert!(!Task::ExtractFaces.needs_recognizer());
        assert!(!Task::Training.needs_detector());
        assert!(Task::Training.needs_recognizer());
        assert!(Task::Filter.needs_detector() && Task::Filter.needs_recognizer());
    }

    #[test]
    fn test_extraction_only_loads_detector() {
        let err = load_error(Task::ExtractFaces);
        assert!(err.contains("yunet.onnx"), "{}", err);
        assert!(!err.contains("sface.onnx"), "{}", err);
    }

    #[test]
    fn test_training_only_loads_recognizer() {
        let err = load_error(Task::Training);
        assert!(err.contains("sface.onnx"), "{}", err);
        assert!(!err.contains("yunet.onnx"), "{}", err);
    }

    #[test]
    fn test_unloaded_model_refuses_work() {
        let mut detector = Unloaded(Task::Training);
        assert!(detector.detect_faces(&PathBuf::from("a.jpg")).is_err());

        let mut recognizer = Unloaded(Task::ExtractFaces);
        let face = DynamicImage::new_rgb8(1, 1);
        assert!(recognizer.add_faces(&[face.clone()], "shin", 1).is_err());
        assert!(recognizer.predict_best(&face).is_err());
        assert!(FaceRecognizer::serialize(&recognizer).is_err());
    }
}
