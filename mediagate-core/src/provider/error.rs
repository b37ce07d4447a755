// Extraction Error Types

use std::time::Duration;

/// Failure to resolve a locator or open its byte stream
///
/// Messages coming from the engine are carried verbatim; nothing in the
/// gateway inspects them.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("locator must not be empty")]
    EmptyLocator,

    #[error("{0}")]
    Upstream(String),

    #[error("failed to launch extraction engine: {0}")]
    Launch(#[from] std::io::Error),

    #[error("invalid engine output: {0}")]
    InvalidOutput(String),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
