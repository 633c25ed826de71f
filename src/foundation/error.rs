/// Convenience result type used across marionette.
pub type DeformResult<T> = Result<T, DeformError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Per-frame deformation paths never return these to the host: degenerate geometry and cache
/// misses recover to "unchanged", numeric failures are sanitized lane by lane. The variants exist
/// so that diagnostics, document loading and configuration share one vocabulary.
#[derive(thiserror::Error, Debug)]
pub enum DeformError {
    /// Zero-length segment, zero-area triangle or collapsed axis.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// NaN or infinity observed at some stage of a computation.
    #[error("numeric invalid: {0}")]
    NumericInvalid(String),

    /// Memoized data absent or sized for a different target shape.
    #[error("cache miss: {0}")]
    CacheMiss(String),

    /// Repeated failures across frames exceeded the configured threshold.
    #[error("consecutive failure: {context} after {frames} frames")]
    ConsecutiveFailure {
        /// Context tag of the last failure.
        context: String,
        /// Number of consecutive invalid frames observed.
        frames: u32,
    },

    /// Invalid user-provided or document data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors when serializing or deserializing documents.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeformError {
    /// Build a [`DeformError::DegenerateGeometry`] value.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateGeometry(msg.into())
    }

    /// Build a [`DeformError::NumericInvalid`] value.
    pub fn numeric(msg: impl Into<String>) -> Self {
        Self::NumericInvalid(msg.into())
    }

    /// Build a [`DeformError::CacheMiss`] value.
    pub fn cache_miss(msg: impl Into<String>) -> Self {
        Self::CacheMiss(msg.into())
    }

    /// Build a [`DeformError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`DeformError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for DeformError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
