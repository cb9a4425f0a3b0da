//! Checks against the real ONNX models. Skipped when the model files are not
//! present (set `FACESORT_MODEL_DIR`, default `models/`).

use anyhow::Result;
use facesort_vision::{FaceDetector, FaceRecognizer};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::PathBuf;

fn model_path(name: &str) -> Option<PathBuf> {
    let dir = std::env::var("FACESORT_MODEL_DIR").unwrap_or_else(|_| "models".to_string());
    let path = PathBuf::from(dir).join(name);
    if path.exists() {
        Some(path)
    } else {
        eprintln!("Skipping: {} not found", path.display());
        None
    }
}

fn gradient(seed: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(150, 150, |x, y| {
        Rgb([
            (x as u8).wrapping_add(seed),
            (y as u8).wrapping_mul(2),
            seed,
        ])
    }))
}

#[test]
fn test_blank_image_has_no_faces() -> Result<()> {
    env_logger::try_init().ok();
    let Some(path) = model_path("face_detection_yunet_2023mar.onnx") else {
        return Ok(());
    };
    let mut detector = FaceDetector::load(&path, 0.6, 0.3, 150)?;

    let blank = DynamicImage::new_rgb8(320, 240);
    let faces = detector.detect_faces(&blank)?;
    assert!(faces.is_empty(), "found {} face(s) in a blank frame", faces.len());
    Ok(())
}

#[test]
fn test_recognizer_matches_its_own_training_face() -> Result<()> {
    env_logger::try_init().ok();
    let Some(path) = model_path("face_recognition_sface_2021dec.onnx") else {
        return Ok(());
    };
    let mut recognizer = FaceRecognizer::load(&path)?;

    let a = gradient(10);
    let b = gradient(200);

    let d = recognizer.descriptor(&a)?;
    let norm: f32 = d.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-3);

    recognizer.add_faces(&[a.clone()], "a", 1)?;
    recognizer.add_faces(&[b], "b", 3)?;

    let best = recognizer.predict_best(&a)?;
    assert_eq!(best.class_name, "a");
    assert!(best.distance < 1e-3, "distance {}", best.distance);

    let data = recognizer.serialize();
    recognizer.reset();
    assert!(recognizer.predict_best(&a).is_err());
    recognizer.load_model(data)?;
    assert_eq!(recognizer.predict_best(&a)?.class_name, "a");
    Ok(())
}
