use anyhow::{Context, Result};
use directories::ProjectDirs;
use facefind_vision::{
    pipeline::{DEFAULT_NMS_THRESHOLD, DEFAULT_SCORE_THRESHOLD},
    ModelPaths, DEFAULT_L2_THRESHOLD,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::matcher::MatchPolicy;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "facefind"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEFIND_CONFIG_PATH") {
    Some(path) => PathBuf::from(path),
    None => PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("facefind.toml")),
});

pub static MODEL_DIR: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEFIND_MODEL_DIR") {
    Some(path) => PathBuf::from(path),
    None => PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.data_dir().join("models"))
        .unwrap_or_else(|| PathBuf::from("models")),
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum embedding distance still counted as the same face.
    pub tolerance: f32,
    pub policy: MatchPolicy,
    /// Directory names never descended into.
    pub skip: Vec<String>,
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        let models = ModelPaths::in_dir(&MODEL_DIR);
        Self {
            tolerance: DEFAULT_L2_THRESHOLD,
            policy: MatchPolicy::default(),
            skip: Vec::new(),
            detector_model: models.detector,
            recognizer_model: models.recognizer,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }
}

impl Config {
    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths {
            detector: self.detector_model.clone(),
            recognizer: self.recognizer_model.clone(),
        }
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
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
