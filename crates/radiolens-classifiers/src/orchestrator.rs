//! Prediction orchestrator: normalize, run the active backend, assemble the result

use crate::classifier::{ModelInfo, PredictionBackend};
use crate::config::RadiolensConfig;
use crate::normalizer::{ImageNormalizer, ImageSource};
use radiolens_core::{Error, ImageIdentity, PredictionResult, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Synchronous, stateless predictor over an immutable backend selection
#[derive(Debug, Clone)]
pub struct RadiographPredictor {
    normalizer: ImageNormalizer,
    backend: PredictionBackend,
}

impl RadiographPredictor {
    pub fn new(normalizer: ImageNormalizer, backend: PredictionBackend) -> Self {
        Self {
            normalizer,
            backend,
        }
    }

    /// Build the normalizer and select the backend once
    pub fn from_config(config: &RadiolensConfig) -> Result<Self> {
        let normalizer = ImageNormalizer::new(config.preprocessing.clone())?;
        let backend = PredictionBackend::select(&config.model, &config.preprocessing);
        let predictor = Self::new(normalizer, backend);

        let info = predictor.info();
        info!(
            provenance = %info.provenance,
            version = %info.version,
            architecture = %info.architecture,
            "Radiograph predictor ready"
        );
        Ok(predictor)
    }

    /// Classify one image.
    ///
    /// The image is always normalized first, so unreadable input fails the
    /// same way whichever backend is active. A panic inside the backend is
    /// reported as an internal error.
    pub fn predict(
        &self,
        source: &ImageSource,
        identity: &ImageIdentity,
    ) -> Result<PredictionResult> {
        let start = Instant::now();

        let tensor = self.normalizer.normalize(source)?;

        let distribution =
            catch_unwind(AssertUnwindSafe(|| self.backend.predict(&tensor, identity))).map_err(
                |payload| {
                    Error::internal(format!("prediction panicked: {}", panic_message(&*payload)))
                },
            )??;

        let latency_us = start.elapsed().as_micros() as u64;
        let result = PredictionResult::new(
            distribution,
            self.backend.provenance(),
            self.backend.version(),
            identity.clone(),
        )
        .with_latency_us(latency_us);

        debug!(
            identity = %identity,
            class = %result.predicted_class(),
            confidence = result.confidence(),
            provenance = %result.provenance(),
            latency_us,
            "Prediction complete"
        );
        Ok(result)
    }

    /// Classify a file, using its path string as the identity
    pub fn predict_path(&self, path: impl AsRef<Path>) -> Result<PredictionResult> {
        let path = path.as_ref();
        self.predict(&ImageSource::from(path), &ImageIdentity::from_path(path))
    }

    pub fn backend(&self) -> &PredictionBackend {
        &self.backend
    }

    pub fn normalizer(&self) -> &ImageNormalizer {
        &self.normalizer
    }

    pub fn info(&self) -> ModelInfo {
        self.backend.info(self.normalizer.config())
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use radiolens_core::{ClassLabel, Provenance};
    use std::io::Cursor;

    fn png() -> ImageSource {
        let image = RgbImage::from_fn(50, 40, |x, y| Rgb([(x * 5) as u8, (y * 6) as u8, 90]));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        ImageSource::bytes(buf.into_inner())
    }

    fn fallback_predictor() -> RadiographPredictor {
        RadiographPredictor::new(ImageNormalizer::default(), PredictionBackend::fallback())
    }

    #[test]
    fn test_fallback_result() {
        let predictor = fallback_predictor();
        let id = ImageIdentity::new("patient_001.jpg");
        let result = predictor.predict(&png(), &id).unwrap();

        assert_eq!(result.provenance(), Provenance::Fallback);
        assert_eq!(result.model_version(), "1.0.0-mock");
        assert_eq!(result.identity(), &id);
        let (label, p) = result.probabilities().argmax();
        assert_eq!(result.predicted_class(), label);
        assert_eq!(result.confidence(), p);
    }

    #[test]
    fn test_decode_error_propagates_on_fallback() {
        let predictor = fallback_predictor();
        let err = predictor
            .predict(&ImageSource::bytes(b"not an image".to_vec()), &"notes.jpg".into())
            .unwrap_err();
        assert_eq!(err.kind(), "decode_error");
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        struct Boom;
        impl crate::classifier::ImageClassifier for Boom {
            fn predict(&self, _: &crate::normalizer::NormalizedTensor) -> Result<Vec<f64>> {
                panic!("weights corrupted");
            }
            fn name(&self) -> &str {
                "boom"
            }
        }

        let predictor = RadiographPredictor::new(
            ImageNormalizer::default(),
            PredictionBackend::model(std::sync::Arc::new(Boom)),
        );
        let err = predictor.predict(&png(), &"a.png".into()).unwrap_err();
        assert_eq!(err.kind(), "internal_error");
        assert!(err.to_string().contains("weights corrupted"));

        // a second panic is contained the same way
        assert!(predictor.predict(&png(), &"a.png".into()).is_err());
    }

    #[test]
    fn test_disabled_model_config() {
        let mut config = RadiolensConfig::default();
        config.model.enabled = false;
        let predictor = RadiographPredictor::from_config(&config).unwrap();
        assert_eq!(predictor.info().provenance, Provenance::Fallback);
        let result = predictor.predict(&png(), &"x".into()).unwrap();
        assert!(ClassLabel::ALL.contains(&result.predicted_class()));
    }
}
