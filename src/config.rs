use anyhow::{Context, Result};
use lookalike_vision::ModelPaths;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CapturePolicy, DEFAULT_MAX_ATTEMPTS};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("LOOKALIKE_CONFIG_PATH").unwrap_or("/usr/local/etc/lookalike/config.toml"))
});

pub static MODEL_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("LOOKALIKE_MODEL_PREFIX").unwrap_or("/usr/local/share/lookalike/models"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device of the camera to scan with.
    pub camera: String,
    /// Directory of labelled portraits.
    pub gallery_dir: PathBuf,
    /// Where annotated images are written.
    pub output_dir: PathBuf,
    /// TrueType font for the caption on the user image.
    pub font: PathBuf,
    pub max_attempts: u32,
    pub frame_delay_ms: u64,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let models = ModelPaths::in_dir(*MODEL_PREFIX);
        Self {
            camera: "/dev/video0".to_string(),
            gallery_dir: PathBuf::from("ImagesPresidents"),
            output_dir: PathBuf::from("lookalike-out"),
            font: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            frame_delay_ms: 0,
            score_threshold: 0.6,
            nms_threshold: 0.3,
            detector_model: models.detector,
            recognizer_model: models.recognizer,
        }
    }
}

impl Config {
    pub fn models(&self) -> ModelPaths {
        ModelPaths {
            detector: self.detector_model.clone(),
            recognizer: self.recognizer_model.clone(),
        }
    }

    pub fn capture_policy(&self) -> CapturePolicy {
        CapturePolicy {
            max_attempts: self.max_attempts,
            frame_delay: Duration::from_millis(self.frame_delay_ms),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    if cfg.max_attempts == 0 {
        anyhow::bail!("max_attempts in {} must be at least 1", path.display());
    }
    Ok(cfg)
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
