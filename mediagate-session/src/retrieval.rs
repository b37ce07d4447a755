use mediagate_core::models::DownloadRequest;
use mediagate_core::service::MetadataService;
use tracing::{info, warn};

use crate::progress::{ProgressSource, ProgressTracker};
use crate::registry::{ChannelHandle, ChannelRegistry, SendOutcome};

/// How a tracked retrieval ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalOutcome {
    Completed,
    Failed,
    /// The channel went away before a terminal event could be sent
    Abandoned,
}

/// Runs retrievals requested over a progress channel
///
/// Resolves the metadata first, then reports progress from the configured
/// source and ends with the completion summary. A failed lookup is reported
/// right after `Started`. Everything is sent to the one registration in the
/// `ChannelHandle`; when it disconnects the run stops without another send.
#[derive(Clone)]
pub struct RetrievalRunner {
    registry: ChannelRegistry,
    metadata: MetadataService,
    source: ProgressSource,
}

impl RetrievalRunner {
    #[must_use]
    pub const fn new(
        registry: ChannelRegistry,
        metadata: MetadataService,
        source: ProgressSource,
    ) -> Self {
        Self {
            registry,
            metadata,
            source,
        }
    }

    pub async fn run(&self, channel: &ChannelHandle, request: &DownloadRequest) -> RetrievalOutcome {
        info!(
            channel_id = %channel.id,
            session = channel.session,
            locator = %request.locator,
            variant = request.variant().unwrap_or("default"),
            "Tracked retrieval started"
        );

        let cancel = &channel.cancel;
        let mut tracker = ProgressTracker::new(self.registry.clone(), channel.clone());
        if !matches!(tracker.start().await, Ok(SendOutcome::Delivered)) {
            return RetrievalOutcome::Abandoned;
        }

        let described = tokio::select! {
            biased;
            () = cancel.cancelled() => return RetrievalOutcome::Abandoned,
            described = self.metadata.describe(&request.locator) => described,
        };
        let metadata = match described {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(channel_id = %channel.id, error = %e, "Tracked retrieval failed");
                return match tracker.fail(e.detail()).await {
                    Ok(SendOutcome::Delivered) => RetrievalOutcome::Failed,
                    _ => RetrievalOutcome::Abandoned,
                };
            }
        };

        let interval = self.source.interval();
        for percent in self.source.percents() {
            tokio::select! {
                () = cancel.cancelled() => return RetrievalOutcome::Abandoned,
                () = tokio::time::sleep(interval) => {}
            }
            if !matches!(tracker.tick(percent).await, Ok(SendOutcome::Delivered)) {
                return RetrievalOutcome::Abandoned;
            }
        }

        let summary = MetadataService::summarize(&metadata);
        match tracker.finish(summary).await {
            Ok(SendOutcome::Delivered) => {
                info!(channel_id = %channel.id, title = %metadata.title, "Tracked retrieval completed");
                RetrievalOutcome::Completed
            }
            _ => RetrievalOutcome::Abandoned,
        }
    }
}
