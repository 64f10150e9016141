//! Radiolens Classifiers
//!
//! Radiograph classification into Normal, Crack, Fracture and Hemorrhage.
//!
//! A prediction runs in three stages:
//! - Normalization: decode, CLAHE on the lightness channel, stretch to the
//!   target resolution, scale to `[0, 1]`
//! - Backend: a trained Candle network when one loads at startup, otherwise a
//!   deterministic hash-seeded fallback
//! - Assembly: argmax with a fixed tie-break order, provenance and version
//!
//! [`PredictionService`] runs the synchronous predictor on blocking workers
//! with a bounded number of concurrent predictions.

pub mod clahe;
pub mod classifier;
pub mod color;
pub mod config;
pub mod fallback;
#[cfg(feature = "ml-models")]
pub mod model_loader;
pub mod normalizer;
pub mod orchestrator;
pub mod service;

pub use classifier::{ImageClassifier, ModelInfo, PredictionBackend};
pub use config::{
    DeviceSpec, ModelSettings, PreprocessingConfig, RadiolensConfig, ResizeFilterSpec,
    ServiceSettings,
};
pub use fallback::{FallbackPredictor, IdentitySeed};
#[cfg(feature = "ml-models")]
pub use model_loader::{CandleImageClassifier, DeviceType, ModelMetadata, RadiographCnn};
pub use normalizer::{ImageNormalizer, ImageSource, NormalizedTensor};
pub use orchestrator::RadiographPredictor;
pub use service::PredictionService;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ImageClassifier, PredictionBackend};
    pub use crate::config::RadiolensConfig;
    pub use crate::normalizer::{ImageNormalizer, ImageSource, NormalizedTensor};
    pub use crate::orchestrator::RadiographPredictor;
    pub use crate::service::PredictionService;
    pub use radiolens_core::prelude::*;
}
