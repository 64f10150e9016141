//! Radiolens Core
//!
//! Core types and error handling shared across Radiolens components.
//!
//! This crate provides:
//! - The four diagnostic class labels and their tie-break priority
//! - Validated class probability distributions
//! - Prediction results and the structured success/failure documents
//! - The error taxonomy used by every other crate

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    ClassDistribution, ClassLabel, FailureReport, ImageIdentity, PredictionReport,
    PredictionResult, Provenance, SuccessReport, DISTRIBUTION_TOLERANCE, FALLBACK_VERSION,
    MODEL_VERSION, NUM_CLASSES,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        ClassDistribution, ClassLabel, ImageIdentity, PredictionReport, PredictionResult,
        Provenance,
    };
}
