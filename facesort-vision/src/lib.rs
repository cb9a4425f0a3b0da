//! Imaging, face detection and face recognition for facesort.
//!
//! YuNet finds faces and SFace turns aligned face chips into descriptors,
//! both through ONNX Runtime. Resizing and file I/O go through the `image`
//! crate.

pub mod face;
pub mod imaging;
pub mod jitter;
pub mod model;
pub mod recognizer;
pub mod yunet;

pub use face::{Detection, FaceDetector};
pub use recognizer::{FaceRecognizer, Gallery, Prediction, RecognizerError};
