//! In-memory extractor for tests
//!
//! Serves canned metadata and scripted payloads so the session and HTTP
//! layers can be exercised without the real engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};

use super::traits::{ByteStream, MediaExtractor, OpenedStream, SelectedVariant};
use super::{ExtractionError, Result};
use crate::models::{Locator, MediaMetadata, VariantDescriptor};
use crate::service::format::format_size;

/// How a scripted payload ends
#[derive(Debug, Clone)]
enum Ending {
    Eof,
    Fail(String),
    Stall,
}

/// Canned media item
#[derive(Debug, Clone)]
pub struct StaticMedia {
    pub metadata: MediaMetadata,
    chunks: Vec<Bytes>,
    ending: Ending,
    chunk_delay: Option<Duration>,
}

impl StaticMedia {
    #[must_use]
    pub fn new(metadata: MediaMetadata) -> Self {
        Self {
            metadata,
            chunks: Vec::new(),
            ending: Ending::Eof,
            chunk_delay: None,
        }
    }

    /// Item with an mp4 variant "18" of `mp4_size` bytes and a sizeless webm
    /// audio variant "251"
    #[must_use]
    pub fn sample(title: &str, mp4_size: Option<u64>) -> Self {
        let variant = |format_id: &str, ext: &str, resolution: &str, size: Option<u64>| {
            VariantDescriptor {
                format_id: format_id.to_string(),
                ext: ext.to_string(),
                resolution: resolution.to_string(),
                filesize: size,
                filesize_fmt: format_size(size),
                note: "N/A".to_string(),
            }
        };

        Self::new(MediaMetadata {
            id: "fixture".to_string(),
            title: title.to_string(),
            thumbnail: Some("https://img.example/fixture.jpg".to_string()),
            duration: Some(90.0),
            duration_string: Some("1:30".to_string()),
            uploader: Some("fixture".to_string()),
            formats: vec![
                variant("251", "webm", "audio only", None),
                variant("18", "mp4", "640x360", mp4_size),
            ],
            webpage_url: Some("https://media.example/fixture".to_string()),
            description: None,
            view_count: Some(42),
            like_count: Some(7),
        })
    }

    #[must_use]
    pub fn with_chunks<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    /// Raise `message` after the scripted chunks
    #[must_use]
    pub fn failing_with(mut self, message: &str) -> Self {
        self.ending = Ending::Fail(message.to_string());
        self
    }

    /// Never finish after the scripted chunks
    #[must_use]
    pub fn stalling(mut self) -> Self {
        self.ending = Ending::Stall;
        self
    }

    #[must_use]
    pub const fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    fn select(&self, variant: Option<&str>) -> Result<SelectedVariant> {
        let found = match variant {
            None | Some("best") => self.metadata.formats.last(),
            Some(id) => self.metadata.variant(id),
        };
        let found = found.ok_or_else(|| {
            ExtractionError::Upstream("Requested format is not available".to_string())
        })?;

        Ok(SelectedVariant {
            format_id: found.format_id.clone(),
            ext: found.ext.clone(),
            filesize: found.filesize,
        })
    }

    fn payload(&self) -> ByteStream {
        let delay = self.chunk_delay;
        let chunks = stream::iter(self.chunks.clone()).then(move |chunk| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, std::io::Error>(chunk)
        });

        match &self.ending {
            Ending::Eof => chunks.boxed(),
            Ending::Fail(message) => {
                let err = std::io::Error::other(message.clone());
                chunks.chain(stream::once(async move { Err(err) })).boxed()
            }
            Ending::Stall => chunks.chain(stream::pending()).boxed(),
        }
    }
}

/// Extractor backed by a fixed catalogue
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    media: HashMap<String, StaticMedia>,
    failures: HashMap<String, String>,
    resolve_delay: Option<Duration>,
    resolve_calls: Arc<AtomicUsize>,
    open_calls: Arc<AtomicUsize>,
}

impl StaticExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_media(mut self, locator: &str, media: StaticMedia) -> Self {
        self.media.insert(locator.to_string(), media);
        self
    }

    /// Locator that fails to resolve with `message`
    #[must_use]
    pub fn with_failure(mut self, locator: &str, message: &str) -> Self {
        self.failures.insert(locator.to_string(), message.to_string());
        self
    }

    /// Make every `resolve` take `delay`
    #[must_use]
    pub const fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, locator: &Locator) -> Result<&StaticMedia> {
        if let Some(message) = self.failures.get(locator.as_str()) {
            return Err(ExtractionError::Upstream(message.clone()));
        }
        self.media.get(locator.as_str()).ok_or_else(|| {
            ExtractionError::Upstream(format!("Unsupported URL: {locator}"))
        })
    }
}

#[async_trait]
impl MediaExtractor for StaticExtractor {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn resolve(&self, locator: &Locator) -> Result<MediaMetadata> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.resolve_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.lookup(locator)?.metadata.clone())
    }

    async fn open_stream(&self, locator: &Locator, variant: Option<&str>) -> Result<OpenedStream> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let media = self.lookup(locator)?;
        let selected = media.select(variant)?;

        Ok(OpenedStream {
            metadata: media.metadata.clone(),
            variant: selected,
            stream: media.payload(),
        })
    }
}
