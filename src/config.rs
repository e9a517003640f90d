use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::pipeline::{PipelineSettings, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::storage::MAX_PAGE_LIMIT;
use crate::suppress::DEFAULT_IOU_THRESHOLD;

const DEFAULT_DB_PATH: &str = "classroom_emotions.db";
const DEFAULT_UPLOAD_DIR: &str = "static/uploads";
const DEFAULT_PROCESSED_DIR: &str = "static/processed_images";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_DETECTOR_INPUT_SIZE: u32 = 640;
const DEFAULT_CLASSIFIER_INPUT_SIZE: u32 = 48;
const DEFAULT_CLASSIFIER_LABELS: [&str; 7] =
    ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];
const DEFAULT_HISTORY_LIMIT: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    db_path: Option<String>,
    upload_dir: Option<PathBuf>,
    processed_dir: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
    suppression: Option<SuppressionConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    history: Option<HistoryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SuppressionConfigFile {
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    default_limit: Option<u32>,
    max_limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: String,
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub detector: DetectorSettings,
    /// Threshold for the post-detection suppression pass.
    pub iou_threshold: f32,
    pub classifier: ClassifierSettings,
    pub history: HistorySettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct HistorySettings {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_file(ServiceConfigFile::default())
    }
}

impl ServiceConfig {
    /// Defaults, then the file named by `CLASSROOM_LENS_CONFIG`, then
    /// `CLASSROOM_LENS_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CLASSROOM_LENS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            confidence_threshold: self.detector.confidence_threshold,
            detector_iou_threshold: self.detector.iou_threshold,
            suppression_iou_threshold: self.iou_threshold,
        }
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        let classifier = file.classifier.unwrap_or_default();
        let history = file.history.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            upload_dir: file
                .upload_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            processed_dir: file
                .processed_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROCESSED_DIR)),
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector.model_path,
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                input_size: detector.input_size.unwrap_or(DEFAULT_DETECTOR_INPUT_SIZE),
            },
            iou_threshold: file
                .suppression
                .and_then(|s| s.iou_threshold)
                .unwrap_or(DEFAULT_IOU_THRESHOLD),
            classifier: ClassifierSettings {
                backend: classifier
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: classifier.model_path,
                input_size: classifier
                    .input_size
                    .unwrap_or(DEFAULT_CLASSIFIER_INPUT_SIZE),
                labels: classifier.labels.unwrap_or_else(|| {
                    DEFAULT_CLASSIFIER_LABELS
                        .iter()
                        .map(|l| l.to_string())
                        .collect()
                }),
            },
            history: HistorySettings {
                default_limit: history.default_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
                max_limit: history.max_limit.unwrap_or(MAX_PAGE_LIMIT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_var("CLASSROOM_LENS_DB_PATH") {
            self.db_path = path;
        }
        if let Some(dir) = non_empty_var("CLASSROOM_LENS_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_var("CLASSROOM_LENS_PROCESSED_DIR") {
            self.processed_dir = PathBuf::from(dir);
        }
        if let Some(backend) = non_empty_var("CLASSROOM_LENS_DETECTOR_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(model) = non_empty_var("CLASSROOM_LENS_DETECTOR_MODEL") {
            self.detector.model_path = Some(PathBuf::from(model));
        }
        if let Some(backend) = non_empty_var("CLASSROOM_LENS_CLASSIFIER_BACKEND") {
            self.classifier.backend = backend;
        }
        if let Some(model) = non_empty_var("CLASSROOM_LENS_CLASSIFIER_MODEL") {
            self.classifier.model_path = Some(PathBuf::from(model));
        }
        if let Some(raw) = non_empty_var("CLASSROOM_LENS_IOU_THRESHOLD") {
            self.iou_threshold = raw.trim().parse().map_err(|_| {
                anyhow!("CLASSROOM_LENS_IOU_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        self.classifier.backend = self.classifier.backend.trim().to_lowercase();

        check_unit("detector.confidence_threshold", self.detector.confidence_threshold)?;
        check_unit("detector.iou_threshold", self.detector.iou_threshold)?;
        check_unit("suppression.iou_threshold", self.iou_threshold)?;

        if self.detector.input_size == 0 {
            return Err(anyhow!("detector.input_size must be greater than zero"));
        }
        if self.classifier.input_size == 0 {
            return Err(anyhow!("classifier.input_size must be greater than zero"));
        }
        if self.classifier.labels.is_empty() {
            return Err(anyhow!("classifier.labels cannot be empty"));
        }
        if self.history.max_limit == 0 || self.history.max_limit > MAX_PAGE_LIMIT {
            return Err(anyhow!(
                "history.max_limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            ));
        }
        if self.history.default_limit == 0 || self.history.default_limit > self.history.max_limit {
            return Err(anyhow!(
                "history.default_limit must be between 1 and history.max_limit"
            ));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be between 0 and 1, got {}", name, value));
    }
    Ok(())
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// JSON, or TOML when the file ends in `.toml`.
fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
