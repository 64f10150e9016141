//! Error types for Radiolens

/// Result type alias using Radiolens's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Radiolens operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source could not be read or interpreted as an image
    #[error("decode error: {0}")]
    Decode(String),

    /// The active predictor returned a malformed output
    #[error("backend contract violated: {0}")]
    BackendContract(String),

    /// The model artifact could not be loaded
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new backend contract error
    pub fn backend_contract(msg: impl Into<String>) -> Self {
        Self::BackendContract(msg.into())
    }

    /// Create a new model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable name of the error category.
    ///
    /// This is the value placed in the `error_kind` field of failure documents.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::BackendContract(_) => "backend_contract_error",
            Self::ModelLoad(_) => "model_load_error",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the failure was caused by the caller's input rather than a defect
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
