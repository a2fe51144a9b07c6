use thiserror::Error;

/// Errors that abort a localization call.
///
/// Geometric failures (not enough data, no consensus, refinement
/// divergence) are not errors; they are reported through
/// [`crate::LocalizationStatus`].
#[derive(Debug, Error)]
pub enum LocalizeError {
    /// Parameters or call inputs are inconsistent.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The reconstruction cannot be turned into an association database.
    #[error("invalid map: {0}")]
    InvalidMap(String),
    /// The marker describer failed on an image.
    #[error("marker detection failed: {0}")]
    Detection(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LocalizeError>;

pub(crate) fn config_error(msg: impl Into<String>) -> LocalizeError {
    LocalizeError::Configuration(msg.into())
}
