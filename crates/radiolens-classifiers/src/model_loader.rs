//! Model loading for the Candle-based radiograph classifier
//!
//! The artifact is a SafeTensors file holding `conv.weight`, `conv.bias`,
//! `head.weight` and `head.bias`, plus an optional JSON metadata sidecar.

use crate::classifier::ImageClassifier;
use crate::config::{DeviceSpec, ModelSettings};
use crate::normalizer::{NormalizedTensor, CHANNELS};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Conv2d, Conv2dConfig, Linear, VarBuilder};
use radiolens_core::{ClassLabel, Error, Result, MODEL_VERSION, NUM_CLASSES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize), // GPU index
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceType {
    pub fn from_settings(settings: &ModelSettings) -> Self {
        match settings.device {
            DeviceSpec::Cpu => Self::Cpu,
            DeviceSpec::Cuda => Self::Cuda(settings.device_index),
            DeviceSpec::Metal => Self::Metal(settings.device_index),
        }
    }

    /// Create Candle device from device type
    pub fn create_device(self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(idx) => Device::new_cuda(idx)
                .map_err(|e| Error::model_load(format!("Failed to create CUDA device: {}", e))),
            Self::Metal(idx) => Device::new_metal(idx)
                .map_err(|e| Error::model_load(format!("Failed to create Metal device: {}", e))),
        }
    }
}

/// Network shape parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    /// Feature maps produced by the convolution
    #[serde(default = "default_conv_channels")]
    pub conv_channels: usize,

    /// Square convolution kernel size (odd)
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            conv_channels: default_conv_channels(),
            kernel_size: default_kernel_size(),
        }
    }
}

/// Contents of the JSON sidecar next to the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub architecture: ArchitectureConfig,

    /// `[width, height]` the network was trained on
    #[serde(default = "default_input_size")]
    pub input_size: [u32; 2],

    /// Output order of the classifier head
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            description: None,
            architecture: ArchitectureConfig::default(),
            input_size: default_input_size(),
            class_names: default_class_names(),
        }
    }
}

impl ModelMetadata {
    /// Parse a sidecar file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::model_load(format!("Failed to read metadata {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::model_load(format!("Failed to parse metadata {}: {}", path.display(), e))
        })
    }

    /// Read the sidecar if it exists, otherwise assume defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            debug!(path = %path.display(), "No model metadata, using defaults");
            Ok(Self::default())
        }
    }

    /// Check the artifact agrees with the fixed labels and the normalizer output
    pub fn validate(&self, input_size: (u32, u32)) -> Result<()> {
        let classes = self
            .class_names
            .iter()
            .map(|name| name.parse::<ClassLabel>())
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::model_load(format!("Model classes are invalid: {}", e)))?;
        if classes != ClassLabel::ALL {
            return Err(Error::model_load(format!(
                "Model classes {:?} do not match {:?}",
                self.class_names,
                ClassLabel::ALL
            )));
        }
        if (self.input_size[0], self.input_size[1]) != input_size {
            return Err(Error::model_load(format!(
                "Model input size {}x{} does not match preprocessing target {}x{}",
                self.input_size[0], self.input_size[1], input_size.0, input_size.1
            )));
        }
        let arch = &self.architecture;
        if arch.conv_channels == 0 || arch.kernel_size == 0 || arch.kernel_size % 2 == 0 {
            return Err(Error::model_load(format!(
                "Unsupported architecture: {} channels, kernel {}",
                arch.conv_channels, arch.kernel_size
            )));
        }
        Ok(())
    }
}

/// Convolution, ReLU, global average pooling, linear head, softmax
#[derive(Debug, Clone)]
pub struct RadiographCnn {
    conv: Conv2d,
    head: Linear,
}

impl RadiographCnn {
    pub fn load(vb: VarBuilder, arch: &ArchitectureConfig) -> candle_core::Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: arch.kernel_size / 2,
            ..Default::default()
        };
        let conv = candle_nn::conv2d(
            CHANNELS,
            arch.conv_channels,
            arch.kernel_size,
            conv_cfg,
            vb.pp("conv"),
        )?;
        let head = candle_nn::linear(arch.conv_channels, NUM_CLASSES, vb.pp("head"))?;
        Ok(Self { conv, head })
    }
}

impl Module for RadiographCnn {
    /// `(batch, 3, height, width)` in, `(batch, 4)` probabilities out as f64
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let features = self.conv.forward(xs)?.relu()?.mean((2, 3))?;
        let logits = self.head.forward(&features)?.to_dtype(DType::F64)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }
}

/// Trained classifier evaluated with Candle
pub struct CandleImageClassifier {
    name: String,
    model: RadiographCnn,
    device: Device,
    metadata: ModelMetadata,
    weights_path: Option<PathBuf>,
}

impl CandleImageClassifier {
    /// Load weights and metadata named by the settings.
    ///
    /// `input_size` is the normalizer's `(width, height)`.
    pub fn load(settings: &ModelSettings, input_size: (u32, u32)) -> Result<Self> {
        let weights_path = settings.path.clone();
        if !weights_path.exists() {
            return Err(Error::model_load(format!(
                "Model file not found: {}",
                weights_path.display()
            )));
        }

        let metadata = ModelMetadata::load_or_default(settings.metadata_path())?;
        metadata.validate(input_size)?;

        let device = DeviceType::from_settings(settings).create_device()?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)
                .map_err(|e| Error::model_load(format!("Failed to load weights: {}", e)))?
        };

        let mut classifier = Self::from_var_builder(vb, metadata, device)?;
        classifier.weights_path = Some(weights_path);
        Ok(classifier)
    }

    /// Build from an already populated VarBuilder
    pub fn from_var_builder(
        vb: VarBuilder,
        metadata: ModelMetadata,
        device: Device,
    ) -> Result<Self> {
        let model = RadiographCnn::load(vb, &metadata.architecture)
            .map_err(|e| Error::model_load(format!("Failed to build network: {}", e)))?;

        Ok(Self {
            name: metadata.name.clone(),
            model,
            device,
            metadata,
            weights_path: None,
        })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn weights_path(&self) -> Option<&Path> {
        self.weights_path.as_deref()
    }

    fn to_input(&self, tensor: &NormalizedTensor) -> candle_core::Result<Tensor> {
        let [h, w, c] = tensor.shape();
        Tensor::from_slice(tensor.data(), (h, w, c), &self.device)?
            .permute((2, 0, 1))?
            .contiguous()?
            .unsqueeze(0)
    }
}

impl ImageClassifier for CandleImageClassifier {
    fn predict(&self, tensor: &NormalizedTensor) -> Result<Vec<f64>> {
        let [h, w, _] = tensor.shape();
        let [mw, mh] = self.metadata.input_size;
        if (w, h) != (mw as usize, mh as usize) {
            return Err(Error::backend_contract(format!(
                "Tensor is {}x{}, model expects {}x{}",
                w, h, mw, mh
            )));
        }

        let input = self
            .to_input(tensor)
            .map_err(|e| Error::internal(format!("Failed to create input tensor: {}", e)))?;

        self.model
            .forward(&input)
            .and_then(|probs| probs.squeeze(0))
            .and_then(|probs| probs.to_vec1::<f64>())
            .map_err(|e| Error::internal(format!("Model forward pass failed: {}", e)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.metadata.version
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        Some((self.metadata.input_size[0], self.metadata.input_size[1]))
    }

    fn architecture(&self) -> String {
        let arch = &self.metadata.architecture;
        format!(
            "conv{k}x{k}({c}) relu gap linear({c}->{n}) softmax",
            k = arch.kernel_size,
            c = arch.conv_channels,
            n = NUM_CLASSES
        )
    }
}

fn default_conv_channels() -> usize {
    32
}

fn default_kernel_size() -> usize {
    3
}

fn default_name() -> String {
    "radiograph-cnn".to_string()
}

fn default_version() -> String {
    MODEL_VERSION.to_string()
}

fn default_input_size() -> [u32; 2] {
    [224, 224]
}

fn default_class_names() -> Vec<String> {
    ClassLabel::ALL.iter().map(|l| l.to_string()).collect()
}
