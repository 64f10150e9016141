//! Configuration for preprocessing, model loading and the prediction service

use image::imageops::FilterType;
use radiolens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "radiolens.yaml";

/// Top-level Radiolens configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadiolensConfig {
    /// Trained model artifact settings
    #[serde(default)]
    pub model: ModelSettings,

    /// Image normalization settings
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,

    /// Concurrency settings for the prediction service
    #[serde(default)]
    pub service: ServiceSettings,
}

/// Where the trained classifier lives and how to run it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Set to false to always use the deterministic fallback
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SafeTensors weights of the trained classifier
    #[serde(default = "default_model_path")]
    pub path: PathBuf,

    /// JSON metadata sidecar; defaults to the weights path with a `.json` extension
    #[serde(default)]
    pub metadata: Option<PathBuf>,

    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceSpec,

    /// Ordinal of the GPU when `device` is not `cpu`
    #[serde(default)]
    pub device_index: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_model_path(),
            metadata: None,
            device: DeviceSpec::Cpu,
            device_index: 0,
        }
    }
}

impl ModelSettings {
    /// Metadata sidecar path, explicit or derived from the weights path
    pub fn metadata_path(&self) -> PathBuf {
        self.metadata
            .clone()
            .unwrap_or_else(|| self.path.with_extension("json"))
    }
}

/// Device specification (for config files)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

/// Resampling filter used when stretching to the target resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilterSpec {
    /// Bilinear
    #[default]
    Triangle,
    /// Cubic spline
    CatmullRom,
    Lanczos3,
}

impl ResizeFilterSpec {
    pub fn to_filter_type(self) -> FilterType {
        match self {
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Image normalization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Output width in pixels
    #[serde(default = "default_target_size")]
    pub target_width: u32,

    /// Output height in pixels
    #[serde(default = "default_target_size")]
    pub target_height: u32,

    /// CLAHE clip limit, relative to a uniform histogram
    #[serde(default = "default_clip_limit")]
    pub clip_limit: f32,

    /// CLAHE tile grid as `[columns, rows]`
    #[serde(default = "default_tile_grid")]
    pub tile_grid: [u32; 2],

    #[serde(default)]
    pub resize_filter: ResizeFilterSpec,

    /// Sources larger than this are rejected before decoding
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_width: default_target_size(),
            target_height: default_target_size(),
            clip_limit: default_clip_limit(),
            tile_grid: default_tile_grid(),
            resize_filter: ResizeFilterSpec::default(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl PreprocessingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(Error::config(format!(
                "target resolution must be non-zero, got {}x{}",
                self.target_width, self.target_height
            )));
        }
        if !(self.clip_limit.is_finite() && self.clip_limit > 0.0) {
            return Err(Error::config(format!(
                "clip limit must be positive, got {}",
                self.clip_limit
            )));
        }
        if self.tile_grid.contains(&0) {
            return Err(Error::config(format!(
                "tile grid must be non-zero, got {:?}",
                self.tile_grid
            )));
        }
        if self.max_image_bytes == 0 {
            return Err(Error::config("max_image_bytes must be non-zero"));
        }
        Ok(())
    }
}

/// Prediction service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Maximum predictions running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl RadiolensConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Load the given file, or `radiolens.yaml` if present, or defaults.
    ///
    /// An explicitly named file that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Override the model weights path
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model.path = path.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.preprocessing.validate()?;
        if self.service.max_concurrency == 0 {
            return Err(Error::config("service.max_concurrency must be at least 1"));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/radiograph_classifier.safetensors")
}

fn default_target_size() -> u32 {
    224
}

fn default_clip_limit() -> f32 {
    2.0
}

fn default_tile_grid() -> [u32; 2] {
    [8, 8]
}

fn default_max_image_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_concurrency() -> usize {
    num_cpus::get().max(1)
}
