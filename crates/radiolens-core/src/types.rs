//! Core types for Radiolens

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Number of diagnostic classes every distribution covers
pub const NUM_CLASSES: usize = 4;

/// Maximum deviation of a distribution's sum from 1.0
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// Version reported for results produced by a trained model without metadata
pub const MODEL_VERSION: &str = "1.0.0";

/// Version reported for results produced by the deterministic fallback
pub const FALLBACK_VERSION: &str = "1.0.0-mock";

/// Diagnostic class of a radiograph.
///
/// Declaration order is the tie-break priority: when two classes share the
/// maximal probability the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    Normal,
    Crack,
    Fracture,
    Hemorrhage,
}

impl ClassLabel {
    /// All labels in priority order
    pub const ALL: [ClassLabel; NUM_CLASSES] = [
        ClassLabel::Normal,
        ClassLabel::Crack,
        ClassLabel::Fracture,
        ClassLabel::Hemorrhage,
    ];

    /// Position of this label in model output and in [`ClassLabel::ALL`]
    pub fn index(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Crack => 1,
            Self::Fracture => 2,
            Self::Hemorrhage => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Crack => "Crack",
            Self::Fracture => "Fracture",
            Self::Hemorrhage => "Hemorrhage",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::config(format!("unknown class label: {s}")))
    }
}

/// Probability distribution over the four diagnostic classes.
///
/// Every value is finite, strictly positive and at most 1, and the values sum
/// to 1 within [`DISTRIBUTION_TOLERANCE`]. Instances can only be built through
/// validating constructors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<ClassLabel, f64>",
    try_from = "BTreeMap<ClassLabel, f64>"
)]
pub struct ClassDistribution {
    probabilities: [f64; NUM_CLASSES],
}

impl ClassDistribution {
    /// Build a distribution from probabilities in [`ClassLabel::ALL`] order
    pub fn new(probabilities: [f64; NUM_CLASSES]) -> Result<Self> {
        for (label, p) in ClassLabel::ALL.iter().zip(probabilities) {
            if !p.is_finite() {
                return Err(Error::backend_contract(format!(
                    "non-finite probability for {label}: {p}"
                )));
            }
            if p <= 0.0 || p > 1.0 {
                return Err(Error::backend_contract(format!(
                    "probability for {label} outside (0, 1]: {p}"
                )));
            }
        }

        let sum: f64 = probabilities.iter().sum();
        if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(Error::backend_contract(format!(
                "probabilities sum to {sum}, expected 1.0"
            )));
        }

        Ok(Self { probabilities })
    }

    /// Build a distribution from raw backend scores, checking the class count first
    pub fn from_scores(scores: &[f64]) -> Result<Self> {
        let probabilities: [f64; NUM_CLASSES] = scores.try_into().map_err(|_| {
            Error::backend_contract(format!(
                "expected {NUM_CLASSES} class scores, got {}",
                scores.len()
            ))
        })?;
        Self::new(probabilities)
    }

    /// Probability assigned to `label`
    pub fn get(&self, label: ClassLabel) -> f64 {
        self.probabilities[label.index()]
    }

    /// Probabilities in [`ClassLabel::ALL`] order
    pub fn values(&self) -> [f64; NUM_CLASSES] {
        self.probabilities
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassLabel, f64)> + '_ {
        ClassLabel::ALL.iter().copied().zip(self.probabilities.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.probabilities.iter().sum()
    }

    /// Most probable label and its probability; ties go to the earlier label
    pub fn argmax(&self) -> (ClassLabel, f64) {
        let mut best = ClassLabel::Normal;
        let mut best_p = self.probabilities[0];
        for (label, p) in self.iter().skip(1) {
            if p > best_p {
                best = label;
                best_p = p;
            }
        }
        (best, best_p)
    }
}

impl From<ClassDistribution> for BTreeMap<ClassLabel, f64> {
    fn from(dist: ClassDistribution) -> Self {
        dist.iter().collect()
    }
}

impl TryFrom<BTreeMap<ClassLabel, f64>> for ClassDistribution {
    type Error = Error;

    fn try_from(map: BTreeMap<ClassLabel, f64>) -> Result<Self> {
        let mut probabilities = [0.0; NUM_CLASSES];
        for label in ClassLabel::ALL {
            probabilities[label.index()] = *map.get(&label).ok_or_else(|| {
                Error::backend_contract(format!("missing probability for {label}"))
            })?;
        }
        Self::new(probabilities)
    }
}

/// Which backend produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Trained classifier loaded from an artifact
    Real,
    /// Deterministic hash-seeded synthetic predictor
    Fallback,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable key seeding the fallback predictor.
///
/// Only reproducibility matters; it carries no security meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageIdentity(String);

impl ImageIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Identity derived from the path string itself
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageIdentity {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ImageIdentity {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Outcome of a single successful prediction.
///
/// The predicted class and confidence are always derived from the stored
/// distribution, so the three can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    predicted_class: ClassLabel,
    confidence: f64,
    probabilities: ClassDistribution,
    provenance: Provenance,
    model_version: String,
    latency_us: u64,
    identity: ImageIdentity,
}

impl PredictionResult {
    /// Assemble a result from a validated distribution
    pub fn new(
        probabilities: ClassDistribution,
        provenance: Provenance,
        model_version: impl Into<String>,
        identity: ImageIdentity,
    ) -> Self {
        let (predicted_class, confidence) = probabilities.argmax();
        Self {
            predicted_class,
            confidence,
            probabilities,
            provenance,
            model_version: model_version.into(),
            latency_us: 0,
            identity,
        }
    }

    /// Attach the measured processing latency
    pub fn with_latency_us(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }

    pub fn predicted_class(&self) -> ClassLabel {
        self.predicted_class
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn probabilities(&self) -> &ClassDistribution {
        &self.probabilities
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn latency_us(&self) -> u64 {
        self.latency_us
    }

    pub fn identity(&self) -> &ImageIdentity {
        &self.identity
    }
}

/// Structured document emitted for a successful prediction
#[derive(Debug, Clone, Serialize)]
pub struct SuccessReport {
    pub success: bool,

    #[serde(flatten)]
    pub result: PredictionResult,
}

/// Structured document emitted for any failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub success: bool,

    /// Human-readable message
    pub error: String,

    /// Machine-readable failure category
    pub error_kind: String,
}

impl FailureReport {
    pub fn new(error: impl Into<String>, error_kind: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_kind: error_kind.into(),
        }
    }

    /// Failure document for a wrong invocation
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(message, "usage_error")
    }
}

impl From<&Error> for FailureReport {
    fn from(err: &Error) -> Self {
        Self::new(err.to_string(), err.kind())
    }
}

/// Either a success or failure document, serialized without a wrapper
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PredictionReport {
    Success(SuccessReport),
    Failure(FailureReport),
}

impl PredictionReport {
    pub fn success(result: PredictionResult) -> Self {
        Self::Success(SuccessReport {
            success: true,
            result,
        })
    }

    pub fn failure(err: &Error) -> Self {
        Self::Failure(FailureReport::from(err))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Render as a single-line JSON document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Result<PredictionResult>> for PredictionReport {
    fn from(outcome: Result<PredictionResult>) -> Self {
        match outcome {
            Ok(result) => Self::success(result),
            Err(err) => Self::failure(&err),
        }
    }
}
