//! Async prediction service with bounded concurrency
//!
//! Each call runs the synchronous predictor on a blocking worker thread while
//! holding a semaphore permit, so at most `max_concurrency` predictions are
//! computing at once.

use crate::classifier::ModelInfo;
use crate::config::RadiolensConfig;
use crate::normalizer::ImageSource;
use crate::orchestrator::{panic_message, RadiographPredictor};
use radiolens_core::{Error, ImageIdentity, PredictionReport, PredictionResult, Result};
use radiolens_telemetry::MetricsCollector;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Concurrent front end over a [`RadiographPredictor`]
#[derive(Clone)]
pub struct PredictionService {
    predictor: Arc<RadiographPredictor>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    metrics: MetricsCollector,
}

impl PredictionService {
    pub fn new(predictor: RadiographPredictor, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            predictor: Arc::new(predictor),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            metrics: MetricsCollector::new(),
        }
    }

    /// Select the backend and size the worker limit from configuration
    pub fn from_config(config: &RadiolensConfig) -> Result<Self> {
        let predictor = RadiographPredictor::from_config(config)?;
        Ok(Self::new(predictor, config.service.max_concurrency))
    }

    /// Share an existing metrics collector
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Classify one image; every outcome is recorded in the metrics
    pub async fn predict(
        &self,
        source: ImageSource,
        identity: ImageIdentity,
    ) -> Result<PredictionResult> {
        let outcome = self.run(source, identity).await;
        match &outcome {
            Ok(result) => self
                .metrics
                .record_prediction(result.provenance(), result.latency_us()),
            Err(e) => {
                if !e.is_input_error() {
                    warn!(error = %e, kind = e.kind(), "Prediction failed");
                }
                self.metrics.record_failure(e.kind());
            }
        }
        outcome
    }

    /// Classify one image and render the outcome as a success or failure document
    pub async fn predict_report(
        &self,
        source: ImageSource,
        identity: ImageIdentity,
    ) -> PredictionReport {
        self.predict(source, identity).await.into()
    }

    async fn run(&self, source: ImageSource, identity: ImageIdentity) -> Result<PredictionResult> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::internal(format!("prediction service closed: {}", e)))?;

        debug!(identity = %identity, "Running prediction");
        let predictor = Arc::clone(&self.predictor);
        match tokio::task::spawn_blocking(move || predictor.predict(&source, &identity)).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(Error::internal(format!(
                "prediction panicked: {}",
                panic_message(&*e.into_panic())
            ))),
            Err(e) => Err(Error::internal(format!("prediction task failed: {}", e))),
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn predictor(&self) -> &RadiographPredictor {
        &self.predictor
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Permits not currently held by a running prediction
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn info(&self) -> ModelInfo {
        self.predictor.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PredictionBackend;
    use crate::normalizer::ImageNormalizer;
    use image::{ImageFormat, Rgb, RgbImage};
    use radiolens_core::Provenance;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn service(max_concurrency: usize) -> PredictionService {
        let predictor =
            RadiographPredictor::new(ImageNormalizer::default(), PredictionBackend::fallback());
        PredictionService::new(predictor, max_concurrency)
    }

    #[tokio::test]
    async fn test_predict_records_success() {
        let service = service(2);
        let result = service
            .predict(ImageSource::bytes(png_bytes()), "patient_001.jpg".into())
            .await
            .unwrap();
        assert_eq!(result.provenance(), Provenance::Fallback);

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.fallback_predictions, 1);
        assert_eq!(snapshot.failures, 0);
        assert_eq!(service.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_predict_report_failure_document() {
        let service = service(1);
        let report = service
            .predict_report(ImageSource::bytes(b"plain text".to_vec()), "notes.jpg".into())
            .await;
        assert!(!report.is_success());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_kind"], "decode_error");
        assert_eq!(service.metrics().snapshot().failures_of("decode_error"), 1);
    }

    #[test]
    fn test_zero_concurrency_is_raised_to_one() {
        assert_eq!(service(0).max_concurrency(), 1);
    }
}
