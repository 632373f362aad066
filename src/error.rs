//! Error types for the parbatch API.

use std::any::Any;
use thiserror::Error;

/// A user closure failed (returned an error or panicked) on one element of one batch.
///
/// Recorded per batch; the batch stops at the failing element and reports this instead of a
/// partial result. Never retried: the work is pure, so a retry would fail the same way.
#[derive(Debug, Error)]
#[error("element at offset {offset} in batch {batch} failed: {cause}")]
pub struct ElementProcessingError {
    /// Index of the batch that was being processed.
    pub batch: usize,
    /// Position of the failing element in the source slice.
    pub offset: usize,
    #[source]
    pub cause: anyhow::Error,
}

impl ElementProcessingError {
    pub fn new(batch: usize, offset: usize, cause: anyhow::Error) -> Self {
        Self {
            batch,
            offset,
            cause,
        }
    }

    /// Build from a caught panic payload (`&str` and `String` payloads keep their message).
    pub fn from_panic(batch: usize, offset: usize, payload: Box<dyn Any + Send>) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(batch, offset, anyhow::anyhow!("panicked: {}", msg))
    }
}

/// Errors surfaced by terminal operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any batch was dispatched (zero batch size, zero workers, zero queue).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// At least one batch failed and no short-circuit decision preempted it.
    /// Carries the failure of the lowest-index failing batch.
    #[error("operation failed: {0}")]
    OperationFailed(#[from] ElementProcessingError),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration(msg.into())
    }

    /// The originating element failure, when this is [`EngineError::OperationFailed`].
    pub fn element_error(&self) -> Option<&ElementProcessingError> {
        match self {
            EngineError::OperationFailed(e) => Some(e),
            EngineError::InvalidConfiguration(_) => None,
        }
    }
}
