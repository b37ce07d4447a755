// Extraction Adapter interface
//
// The only boundary toward the external extraction engine.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::ExtractionError;
use crate::models::{Locator, MediaMetadata};

/// Lazy, finite, forward-only sequence of payload chunks
///
/// Consumed by value, so it cannot be read twice. An `Err` item means the
/// upstream failed after the stream was opened.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// The variant the engine actually selected for a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedVariant {
    pub format_id: String,
    /// Container extension of the delivered payload
    pub ext: String,
    /// Payload size when the engine knows it up front
    pub filesize: Option<u64>,
}

/// Result of `MediaExtractor::open_stream`
pub struct OpenedStream {
    pub metadata: MediaMetadata,
    pub variant: SelectedVariant,
    pub stream: ByteStream,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("metadata", &self.metadata)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

/// Media extraction engine facade
///
/// Implementations turn engine-native results into gateway types and have
/// no side effects beyond whatever the engine does against the origin.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Engine name, for logs and diagnostics
    fn name(&self) -> &'static str;

    /// Describe the media behind `locator`
    async fn resolve(&self, locator: &Locator) -> Result<MediaMetadata, ExtractionError>;

    /// Open the payload of one variant (`None` = engine default)
    async fn open_stream(
        &self,
        locator: &Locator,
        variant: Option<&str>,
    ) -> Result<OpenedStream, ExtractionError>;
}
