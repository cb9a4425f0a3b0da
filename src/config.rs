use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> =
    Lazy::new(|| Path::new(option_env!("FACESORT_CONFIG_PATH").unwrap_or("facesort.toml")));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root holding one folder per person.
    pub data_dir: PathBuf,
    /// Serialized recognizer written by training and read by the filter.
    pub model_path: PathBuf,
    pub extract: ExtractConfig,
    pub training: TrainingConfig,
    pub filter: FilterConfig,
    pub vision: VisionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub person_prefix: String,
    pub small_dir: String,
    pub faces_dir: String,
    pub max_width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub persons: Vec<String>,
    pub jitters: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_width: u32,
    /// Largest prediction distance still counted as a match.
    pub quality: f32,
    pub target_label: String,
    /// Where per-photo resized copies are written; system temp dir if unset.
    pub temp_dir: Option<PathBuf>,
    pub buckets: BucketNames,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketNames {
    pub target: String,
    pub known: String,
    pub unrecognized: String,
    pub failed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Side of the square face chips.
    pub face_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            model_path: PathBuf::from("model.json"),
            extract: ExtractConfig::default(),
            training: TrainingConfig::default(),
            filter: FilterConfig::default(),
            vision: VisionConfig::default(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            person_prefix: "p-".to_string(),
            small_dir: "small".to_string(),
            faces_dir: "faces".to_string(),
            max_width: 800,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            persons: ["mama", "nam", "nhi", "oma", "opa", "papa", "shin"]
                .into_iter()
                .map(String::from)
                .collect(),
            jitters: 15,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_width: 1500,
            quality: 0.7,
            target_label: "shin".to_string(),
            temp_dir: None,
            buckets: BucketNames::default(),
        }
    }
}

impl Default for BucketNames {
    fn default() -> Self {
        Self {
            target: "shin".to_string(),
            known: "family".to_string(),
            unrecognized: "others".to_string(),
            failed: "failed".to_string(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            detector_model: PathBuf::from("models/face_detection_yunet_2023mar.onnx"),
            recognizer_model: PathBuf::from("models/face_recognition_sface_2021dec.onnx"),
            score_threshold: 0.6,
            nms_threshold: 0.3,
            face_size: 150,
        }
    }
}

impl Config {
    /// Folder of a person's photos, e.g. `data/p-shin`.
    pub fn person_dir(&self, label: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}{}", self.extract.person_prefix, label))
    }

    /// Folder of a person's face crops, e.g. `data/p-shin/faces`.
    pub fn faces_dir(&self, label: &str) -> PathBuf {
        self.person_dir(label).join(&self.extract.faces_dir)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.filter
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data).with_context(|| format!("writing config {}", path.display()))?;
    Ok(())
}
