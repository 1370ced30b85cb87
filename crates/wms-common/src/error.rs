//! Error types for the WMS layer engine.

use thiserror::Error;

/// Result type alias using LayerError.
pub type LayerResult<T> = Result<T, LayerError>;

/// Primary error type for layer materialization.
///
/// All failures are local to the layer (or child) being materialized; the
/// engine never retries on its own.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The capabilities fetch failed. The capability cache does not retain
    /// this outcome, so a later call retries.
    #[error("Capabilities request failed: {0}")]
    Network(String),

    /// The capabilities document could not be parsed.
    #[error("Malformed capabilities document: {0}")]
    MalformedCapabilities(String),

    /// An empty or non-monotonic resolution list was passed to the source
    /// builder. Fatal to that single materialization, not to siblings.
    #[error("Invalid resolution list: {0}")]
    InvalidResolutionList(String),

    /// No step of the extent fallback chain produced a usable bounding box.
    #[error("No usable extent could be resolved for the layer")]
    ExtentUnavailable,

    /// Operation on a destroyed layer.
    #[error("Layer has been destroyed")]
    Destroyed,
}

impl LayerError {
    /// Whether a later invocation of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LayerError::Network(_) | LayerError::MalformedCapabilities(_)
        )
    }
}
