//! Prediction backend interface and backend selection

use crate::config::{ModelSettings, PreprocessingConfig};
use crate::fallback::FallbackPredictor;
use crate::normalizer::NormalizedTensor;
use radiolens_core::{
    ClassDistribution, ClassLabel, ImageIdentity, Provenance, Result, FALLBACK_VERSION,
    MODEL_VERSION,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait for trained image classifiers
pub trait ImageClassifier: Send + Sync {
    /// Raw class scores in [`ClassLabel::ALL`] order, already softmax-normalized
    fn predict(&self, tensor: &NormalizedTensor) -> Result<Vec<f64>>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Version reported on results
    fn version(&self) -> &str {
        MODEL_VERSION
    }

    /// Input resolution as `(width, height)`, if the classifier is fixed to one
    fn input_size(&self) -> Option<(u32, u32)> {
        None
    }

    /// Short description of the network for diagnostics
    fn architecture(&self) -> String {
        self.name().to_string()
    }
}

/// Description of the active backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub provenance: Provenance,
    pub version: String,
    pub class_names: Vec<ClassLabel>,
    /// `(width, height)` the backend expects
    pub input_size: (u32, u32),
    pub architecture: String,
}

/// Backend chosen once at startup and used for the lifetime of the service
#[derive(Clone)]
pub enum PredictionBackend {
    /// Trained classifier loaded from an artifact
    Model(Arc<dyn ImageClassifier>),

    /// Deterministic hash-seeded predictor
    Fallback(FallbackPredictor),
}

impl fmt::Debug for PredictionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(model) => f.debug_tuple("Model").field(&model.name()).finish(),
            Self::Fallback(_) => f.write_str("Fallback"),
        }
    }
}

impl PredictionBackend {
    pub fn fallback() -> Self {
        Self::Fallback(FallbackPredictor::new())
    }

    pub fn model(classifier: Arc<dyn ImageClassifier>) -> Self {
        Self::Model(classifier)
    }

    /// Load the trained classifier, or fall back for good if that fails.
    ///
    /// A load failure is logged and never surfaces as an error.
    pub fn select(settings: &ModelSettings, preprocessing: &PreprocessingConfig) -> Self {
        if !settings.enabled {
            info!("Model disabled in configuration, using deterministic fallback");
            return Self::fallback();
        }

        match load_classifier(settings, preprocessing) {
            Ok(classifier) => {
                info!(
                    path = %settings.path.display(),
                    model = classifier.name(),
                    version = classifier.version(),
                    "Loaded trained classifier"
                );
                Self::Model(classifier)
            }
            Err(e) => {
                warn!(
                    path = %settings.path.display(),
                    error = %e,
                    "Failed to load trained classifier, using deterministic fallback"
                );
                Self::fallback()
            }
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            Self::Model(_) => Provenance::Real,
            Self::Fallback(_) => Provenance::Fallback,
        }
    }

    /// Version string stamped on every result from this backend
    pub fn version(&self) -> &str {
        match self {
            Self::Model(model) => model.version(),
            Self::Fallback(_) => FALLBACK_VERSION,
        }
    }

    /// Run the backend.
    ///
    /// The trained classifier sees only the tensor; its output is checked for
    /// shape and validity but never renormalized. The fallback sees only the
    /// identity.
    pub fn predict(
        &self,
        tensor: &NormalizedTensor,
        identity: &ImageIdentity,
    ) -> Result<ClassDistribution> {
        match self {
            Self::Model(model) => {
                let scores = model.predict(tensor)?;
                ClassDistribution::from_scores(&scores)
            }
            Self::Fallback(fallback) => fallback.predict(identity),
        }
    }

    /// Describe the backend given the normalizer's target resolution
    pub fn info(&self, preprocessing: &PreprocessingConfig) -> ModelInfo {
        let configured = (preprocessing.target_width, preprocessing.target_height);
        let (input_size, architecture) = match self {
            Self::Model(model) => (
                model.input_size().unwrap_or(configured),
                model.architecture(),
            ),
            Self::Fallback(_) => (configured, "hash-seeded fallback".to_string()),
        };

        ModelInfo {
            provenance: self.provenance(),
            version: self.version().to_string(),
            class_names: ClassLabel::ALL.to_vec(),
            input_size,
            architecture,
        }
    }
}

#[cfg(feature = "ml-models")]
fn load_classifier(
    settings: &ModelSettings,
    preprocessing: &PreprocessingConfig,
) -> Result<Arc<dyn ImageClassifier>> {
    let size = (preprocessing.target_width, preprocessing.target_height);
    let classifier = crate::model_loader::CandleImageClassifier::load(settings, size)?;
    Ok(Arc::new(classifier))
}

#[cfg(not(feature = "ml-models"))]
fn load_classifier(
    _settings: &ModelSettings,
    _preprocessing: &PreprocessingConfig,
) -> Result<Arc<dyn ImageClassifier>> {
    Err(radiolens_core::Error::model_load(
        "built without the ml-models feature",
    ))
}
