//! Streaming Delivery Pipeline
//!
//! Opens a payload stream through the extractor, derives the response framing
//! and relays chunks to the transport one at a time. Nothing is read ahead of
//! what the transport pulls, so a slow client slows the engine down instead of
//! growing a buffer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{DownloadRequest, MediaMetadata};
use crate::provider::{ByteStream, ExtractionError, MediaExtractor};

/// RFC 5987 `attr-char` complement
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Failure to start a delivery, or the reason a relay was cut short
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Download error: {reason}")]
pub struct DeliveryError {
    reason: String,
}

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<ExtractionError> for DeliveryError {
    fn from(err: ExtractionError) -> Self {
        Self::new(err.to_string())
    }
}

/// Lifecycle of one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Requested,
    StreamOpened,
    Relaying,
    Delivered,
    Aborted,
    Failed,
}

impl DeliveryState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Aborted | Self::Failed)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::StreamOpened => "stream_opened",
            Self::Relaying => "relaying",
            Self::Delivered => "delivered",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Receives transfer progress for one delivery
///
/// `opened` is called at most once, then `advanced` with the running byte
/// count, then exactly one of `finished` or `failed`. Cancelling the token
/// returned by `cancellation` aborts the relay at its next suspension point.
#[async_trait]
pub trait TransferObserver: Send {
    /// Stream opened for `metadata`; `total` is the payload size when known
    async fn opened(&mut self, metadata: &MediaMetadata, total: Option<u64>);

    async fn advanced(&mut self, sent: u64);

    async fn finished(&mut self);

    async fn failed(&mut self, reason: &str);

    fn cancellation(&self) -> CancellationToken;
}

/// Header values for a download response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFraming {
    /// `"{title}.{ext}"` as reported by the engine
    pub filename: String,
    pub content_type: &'static str,
    pub content_disposition: String,
    /// Value for `X-Video-Title`
    pub title_header: String,
}

impl ResponseFraming {
    #[must_use]
    pub fn derive(title: &str, ext: &str) -> Self {
        let filename = format!("{title}.{ext}");
        let content_type = if ext == "mp4" {
            "video/mp4"
        } else {
            "application/octet-stream"
        };

        let fallback: String = filename
            .chars()
            .map(|c| match c {
                '"' | '\\' => '_',
                c if c.is_control() || !c.is_ascii() => '_',
                c => c,
            })
            .collect();
        let mut content_disposition = format!("attachment; filename=\"{fallback}\"");
        if !filename.is_ascii() {
            content_disposition.push_str("; filename*=UTF-8''");
            content_disposition.extend(utf8_percent_encode(&filename, ATTR_CHAR));
        }

        let title_header = if title.chars().all(|c| c.is_ascii() && !c.is_control()) {
            title.to_string()
        } else {
            utf8_percent_encode(title, ATTR_CHAR).to_string()
        };

        Self {
            filename,
            content_type,
            content_disposition,
            title_header,
        }
    }
}

/// A delivery whose headers are known and whose body has not been pulled yet
pub struct StreamedDownload {
    pub delivery_id: String,
    pub framing: ResponseFraming,
    /// Payload size when the engine reported one up front
    pub total: Option<u64>,
    pub body: ByteStream,
}

impl fmt::Debug for StreamedDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedDownload")
            .field("delivery_id", &self.delivery_id)
            .field("framing", &self.framing)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct DeliveryService {
    extractor: Arc<dyn MediaExtractor>,
}

impl DeliveryService {
    #[must_use]
    pub fn new(extractor: Arc<dyn MediaExtractor>) -> Self {
        Self { extractor }
    }

    /// Open the requested variant and prepare it for relay
    ///
    /// Fails before any byte exists when the engine cannot open the stream.
    pub async fn deliver(
        &self,
        request: DownloadRequest,
        mut observer: Option<Box<dyn TransferObserver>>,
    ) -> Result<StreamedDownload, DeliveryError> {
        let delivery_id = nanoid::nanoid!(12);
        info!(
            delivery_id = %delivery_id,
            locator = %request.locator,
            variant = request.variant().unwrap_or("default"),
            state = %DeliveryState::Requested,
            "Delivery requested"
        );

        let opened = match self
            .extractor
            .open_stream(&request.locator, request.variant())
            .await
        {
            Ok(opened) => opened,
            Err(e) => {
                let err = DeliveryError::from(e);
                warn!(
                    delivery_id = %delivery_id,
                    state = %DeliveryState::Failed,
                    error = %err,
                    "Delivery failed before streaming"
                );
                if let Some(observer) = observer.as_mut() {
                    observer.failed(&err.to_string()).await;
                }
                return Err(err);
            }
        };

        let framing = ResponseFraming::derive(&opened.metadata.title, &opened.variant.ext);
        let total = opened.variant.filesize;
        info!(
            delivery_id = %delivery_id,
            format_id = %opened.variant.format_id,
            filename = %framing.filename,
            total = ?total,
            state = %DeliveryState::StreamOpened,
            "Delivery stream opened"
        );

        if let Some(observer) = observer.as_mut() {
            observer.opened(&opened.metadata, total).await;
        }

        let relay = Relay::new(delivery_id.clone(), opened.stream, observer);
        let body = stream::unfold(relay, |mut relay| async move {
            let item = relay.next_chunk().await?;
            Some((item, relay))
        })
        .boxed();

        Ok(StreamedDownload {
            delivery_id,
            framing,
            total,
            body,
        })
    }
}

enum Pulled {
    Chunk(Option<std::io::Result<Bytes>>),
    Cancelled,
}

/// Pull-driven relay from the engine stream to the transport
struct Relay {
    delivery_id: String,
    stream: ByteStream,
    observer: Option<Box<dyn TransferObserver>>,
    cancel: CancellationToken,
    sent: u64,
    state: DeliveryState,
}

impl Relay {
    fn new(
        delivery_id: String,
        stream: ByteStream,
        observer: Option<Box<dyn TransferObserver>>,
    ) -> Self {
        let cancel = observer
            .as_ref()
            .map_or_else(CancellationToken::new, |o| o.cancellation());
        Self {
            delivery_id,
            stream,
            observer,
            cancel,
            sent: 0,
            state: DeliveryState::StreamOpened,
        }
    }

    fn transition(&mut self, next: DeliveryState) {
        match next {
            DeliveryState::Aborted | DeliveryState::Failed => warn!(
                delivery_id = %self.delivery_id,
                from = %self.state,
                state = %next,
                sent = self.sent,
                "Delivery state changed"
            ),
            DeliveryState::Relaying => debug!(
                delivery_id = %self.delivery_id,
                from = %self.state,
                state = %next,
                "Delivery state changed"
            ),
            _ => info!(
                delivery_id = %self.delivery_id,
                from = %self.state,
                state = %next,
                sent = self.sent,
                "Delivery state changed"
            ),
        }
        self.state = next;
    }

    async fn next_chunk(&mut self) -> Option<std::io::Result<Bytes>> {
        if self.state.is_terminal() {
            return None;
        }

        let pulled = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Pulled::Cancelled,
            next = self.stream.next() => Pulled::Chunk(next),
        };

        match pulled {
            Pulled::Chunk(Some(Ok(chunk))) => {
                if self.state == DeliveryState::StreamOpened {
                    self.transition(DeliveryState::Relaying);
                }
                self.sent += chunk.len() as u64;
                if let Some(observer) = self.observer.as_mut() {
                    observer.advanced(self.sent).await;
                }
                Some(Ok(chunk))
            }
            Pulled::Chunk(Some(Err(e))) => {
                self.transition(DeliveryState::Aborted);
                let reason = DeliveryError::new(e.to_string()).to_string();
                if let Some(observer) = self.observer.as_mut() {
                    observer.failed(&reason).await;
                }
                Some(Err(e))
            }
            Pulled::Chunk(None) => {
                self.transition(DeliveryState::Delivered);
                if let Some(observer) = self.observer.as_mut() {
                    observer.finished().await;
                }
                None
            }
            Pulled::Cancelled => {
                self.transition(DeliveryState::Aborted);
                Some(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "progress channel closed",
                )))
            }
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.transition(DeliveryState::Aborted);

        // The client went away; tell the observer without blocking the drop
        if let Some(mut observer) = self.observer.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    observer.failed("Download error: client disconnected").await;
                });
            }
        }
    }
}
