use thiserror::Error;

use crate::provider::ExtractionError;
use crate::service::delivery::DeliveryError;

#[derive(Error, Debug)]
pub enum Error {
    /// Client-facing failure: bad locator, unreachable resource, bad parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure should be reported to the client verbatim
    #[must_use]
    pub const fn is_client_facing(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Message safe to show a client; internal details are masked
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidRequest(msg) => msg.clone(),
            Self::Extraction(e) => e.to_string(),
            Self::Delivery(e) => e.to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DeliveryError;

    #[test]
    fn test_detail_unwraps_client_messages() {
        let err = Error::InvalidRequest("Error getting video info: gone".to_string());
        assert_eq!(err.detail(), "Error getting video info: gone");

        let err = Error::from(DeliveryError::new("gone"));
        assert_eq!(err.detail(), "Download error: gone");
        assert!(err.is_client_facing());
    }

    #[test]
    fn test_detail_masks_internal_errors() {
        let err = Error::Internal("db password leaked".to_string());
        assert_eq!(err.detail(), "Internal server error");
        assert!(!err.is_client_facing());
    }
}
