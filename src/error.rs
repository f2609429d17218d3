//! Experiential error types

use thiserror::Error;

/// Experiential error type
#[derive(Error, Debug)]
pub enum Error {
    /// Bad input: empty required field, malformed date, self-reference
    #[error("Validation error: {0}")]
    Validation(String),

    /// A quality tag outside the closed taxonomy, or a malformed tag path
    #[error("Invalid quality '{tag}': {reason}")]
    InvalidQuality { tag: String, reason: String },

    /// Unknown record id, or a reflects target that does not exist
    #[error("Not found: {id}")]
    NotFound { id: String },

    /// The record existed but has been deleted
    #[error("Record already released: {id}")]
    AlreadyReleased { id: String },

    /// Embedding provider could not serve the request
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Vector store could not serve the request
    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// Vector dimensionality mismatch
    #[error("Schema error: expected {expected} dimensions, got {actual}")]
    Schema { expected: usize, actual: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn already_released(id: impl Into<String>) -> Self {
        Self::AlreadyReleased { id: id.into() }
    }

    pub fn invalid_quality(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuality {
            tag: tag.into(),
            reason: reason.into(),
        }
    }

    /// True for caller mistakes that must never be retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidQuality { .. })
    }

    /// True for failures of optional semantic enhancement that callers
    /// may degrade around.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::StoreUnavailable(_) | Self::Http(_)
        )
    }

    /// Stable machine-readable code used in structured error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidQuality { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyReleased { .. } => "ALREADY_RELEASED",
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::ProviderUnavailable(_) | Self::StoreUnavailable(_) | Self::Http(_) => {
                "UNAVAILABLE"
            }
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for Experiential operations
pub type Result<T> = std::result::Result<T, Error>;
