//! Metadata lookups

use std::sync::Arc;

use tracing::{debug, warn};

use super::format::format_size;
use crate::error::{Error, Result};
use crate::models::{Locator, MediaMetadata, RetrievalSummary};
use crate::provider::MediaExtractor;

/// Produces display-ready descriptions of media items
#[derive(Clone)]
pub struct MetadataService {
    extractor: Arc<dyn MediaExtractor>,
}

impl MetadataService {
    #[must_use]
    pub fn new(extractor: Arc<dyn MediaExtractor>) -> Self {
        Self { extractor }
    }

    /// Resolve `locator` and fill in human-readable variant sizes
    ///
    /// Engine failures are reported as `InvalidRequest` and never retried.
    pub async fn describe(&self, locator: &Locator) -> Result<MediaMetadata> {
        let mut metadata = self.extractor.resolve(locator).await.map_err(|e| {
            warn!(locator = %locator, engine = self.extractor.name(), error = %e, "Metadata lookup failed");
            Error::InvalidRequest(format!("Error getting video info: {e}"))
        })?;

        for variant in &mut metadata.formats {
            variant.filesize_fmt = format_size(variant.filesize);
        }

        debug!(
            locator = %locator,
            title = %metadata.title,
            formats = metadata.formats.len(),
            "Metadata resolved"
        );

        Ok(metadata)
    }

    /// Completion summary for a tracked retrieval
    #[must_use]
    pub fn summarize(metadata: &MediaMetadata) -> RetrievalSummary {
        RetrievalSummary::from(metadata)
    }
}
