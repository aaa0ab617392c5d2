//! Normalization Error Types

use thiserror::Error;

/// Failures on an otherwise well-formed envelope.
///
/// These are processing errors: the event is not committed and will be
/// redelivered.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The embedded resource is not valid JSON
    #[error("Invalid resource JSON: {0}")]
    InvalidResource(#[from] serde_json::Error),

    /// The embedded resource has an unexpected JSON shape
    #[error("Invalid resource: {0}")]
    InvalidShape(String),
}
