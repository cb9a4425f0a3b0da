pub mod backend;
pub mod config;
pub mod extract;
pub mod filter;
pub mod fs_tools;
pub mod selector;
pub mod training;
pub mod walk;

pub use backend::{Context, FaceDetector, FaceRecognizer, ImageCrate, Imaging};
pub use facesort_vision::Prediction;
pub use filter::Bucket;
