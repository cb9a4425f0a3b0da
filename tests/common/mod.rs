//! Scripted stand-ins for the imaging and face libraries.
//!
//! Test "photos" are small text files:
//!
//! ```text
//! width=3000      # reported by `dimensions`, absent = unreadable
//! face 1          # one detected face carrying code 1
//! corrupt         # resize / open fails
//! explode         # detection fails
//! ```
//!
//! A detected face is a 1x1 grey image whose pixel value is its code; the
//! recognizer maps codes to scripted predictions.

#![allow(dead_code)]

use anyhow::{bail, Context as _, Result};
use facesort::config::Config;
use facesort::{Context, FaceDetector, FaceRecognizer, Imaging, Prediction};
use image::{DynamicImage, GrayImage, Luma};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub fn init_logs() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Scratch directory removed on drop.
pub struct TestDir(PathBuf);

impl TestDir {
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("facesort-test-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create test dir");
        Self(dir)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Write `content` at `rel`, creating parent folders.
    pub fn file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.0.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(&path, content).expect("write file");
        path
    }

    /// Config rooted in this directory.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.data_dir = self.0.join("data");
        cfg.model_path = self.0.join("model.json");
        cfg.filter.temp_dir = Some(self.0.join("tmp"));
        cfg
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn face_image(code: u8) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([code])))
}

fn face_code(face: &DynamicImage) -> u8 {
    face.to_luma8().get_pixel(0, 0)[0]
}

/// What the fakes saw, shared with the test after the fakes are boxed.
#[derive(Default)]
pub struct Journal {
    /// `(source, width)` per resize.
    pub resized: Vec<(PathBuf, u32)>,
    /// Files handed to the detector, with whether they existed then.
    pub detected: Vec<(PathBuf, bool)>,
    /// `(label, face count, jitters)` per `add_faces`.
    pub added: Vec<(String, usize, u32)>,
    pub loaded: Option<serde_json::Value>,
}

pub type SharedJournal = Rc<RefCell<Journal>>;

pub struct FakeImaging {
    journal: SharedJournal,
}

impl Imaging for FakeImaging {
    fn resize_to_file(&self, src: &Path, width: u32, dst: &Path) -> Result<()> {
        let content = fs::read_to_string(src).context("reading photo")?;
        if content.contains("corrupt") {
            bail!("cannot decode {}", src.display());
        }
        self.journal
            .borrow_mut()
            .resized
            .push((src.to_path_buf(), width));
        fs::write(dst, content)?;
        Ok(())
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let content = fs::read_to_string(path)?;
        for line in content.lines() {
            if let Some(w) = line.strip_prefix("width=") {
                return Ok((w.trim().parse()?, 1));
            }
        }
        bail!("no size header in {}", path.display())
    }

    fn open(&self, path: &Path) -> Result<DynamicImage> {
        let content = fs::read_to_string(path)?;
        if content.contains("corrupt") {
            bail!("cannot decode {}", path.display());
        }
        let code = content
            .trim()
            .strip_prefix("face ")
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        Ok(face_image(code))
    }

    fn save(&self, img: &DynamicImage, path: &Path) -> Result<()> {
        fs::write(path, format!("face {}", face_code(img)))?;
        Ok(())
    }
}

pub struct FakeDetector {
    journal: SharedJournal,
}

impl FaceDetector for FakeDetector {
    fn detect_faces(&mut self, image: &Path) -> Result<Vec<DynamicImage>> {
        self.journal
            .borrow_mut()
            .detected
            .push((image.to_path_buf(), image.exists()));
        let content = fs::read_to_string(image)?;
        if content.contains("explode") {
            bail!("detector crashed on {}", image.display());
        }
        Ok(content
            .lines()
            .filter_map(|l| l.strip_prefix("face "))
            .filter_map(|c| c.trim().parse().ok())
            .map(face_image)
            .collect())
    }
}

pub struct FakeRecognizer {
    journal: SharedJournal,
    predictions: HashMap<u8, Prediction>,
}

impl FaceRecognizer for FakeRecognizer {
    fn add_faces(&mut self, faces: &[DynamicImage], label: &str, jitters: u32) -> Result<()> {
        self.journal
            .borrow_mut()
            .added
            .push((label.to_string(), faces.len(), jitters));
        Ok(())
    }

    fn predict_best(&mut self, face: &DynamicImage) -> Result<Prediction> {
        let code = face_code(face);
        self.predictions
            .get(&code)
            .cloned()
            .with_context(|| format!("no prediction scripted for face {}", code))
    }

    fn serialize(&self) -> Result<serde_json::Value> {
        let added: Vec<_> = self
            .journal
            .borrow()
            .added
            .iter()
            .map(|(label, n, _)| serde_json::json!({ "className": label, "faces": n }))
            .collect();
        Ok(serde_json::Value::Array(added))
    }

    fn load(&mut self, data: serde_json::Value) -> Result<()> {
        self.journal.borrow_mut().loaded = Some(data);
        Ok(())
    }

    fn reset(&mut self) {
        self.journal.borrow_mut().added.clear();
    }
}

/// Face code → prediction used by the filter tests:
/// 1 = shin @ 0.3, 2 = papa @ 0.5, 3 = shin @ 0.9, 4 = oma @ 0.7
pub fn scripted_predictions() -> HashMap<u8, Prediction> {
    [(1, "shin", 0.3), (2, "papa", 0.5), (3, "shin", 0.9), (4, "oma", 0.7)]
        .into_iter()
        .map(|(code, label, distance)| {
            (
                code,
                Prediction {
                    class_name: label.to_string(),
                    distance,
                },
            )
        })
        .collect()
}

pub fn fake_context(cfg: Config) -> (Context, SharedJournal) {
    let journal = SharedJournal::default();
    let ctx = Context::new(
        cfg,
        Box::new(FakeImaging {
            journal: journal.clone(),
        }),
        Box::new(FakeDetector {
            journal: journal.clone(),
        }),
        Box::new(FakeRecognizer {
            journal: journal.clone(),
            predictions: scripted_predictions(),
        }),
    );
    (ctx, journal)
}
