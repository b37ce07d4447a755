//! Progress Protocol
//!
//! A `ProgressTracker` walks one retrieval through
//! `Idle -> Started -> InProgress -> {Completed, Failed}` and pushes each
//! transition to exactly one channel. Terminal transitions consume the
//! tracker.

use std::time::Duration;

use async_trait::async_trait;
use mediagate_core::config::ProgressConfig;
use mediagate_core::models::{ChannelId, MediaMetadata, RetrievalSummary};
use mediagate_core::service::TransferObserver;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProgressError;
use crate::events::ProgressEvent;
use crate::registry::{ChannelHandle, ChannelRegistry, SendOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Started,
    InProgress,
}

/// State machine for one tracked retrieval
///
/// Bound to a single registration: once that connection goes away every
/// emit reports `NotConnected`, even if the id is reconnected.
pub struct ProgressTracker {
    registry: ChannelRegistry,
    channel: ChannelHandle,
    state: TrackerState,
    last: u8,
}

impl ProgressTracker {
    #[must_use]
    pub const fn new(registry: ChannelRegistry, channel: ChannelHandle) -> Self {
        Self {
            registry,
            channel,
            state: TrackerState::Idle,
            last: 0,
        }
    }

    #[must_use]
    pub const fn channel(&self) -> &ChannelId {
        &self.channel.id
    }

    #[must_use]
    pub const fn state(&self) -> TrackerState {
        self.state
    }

    /// Last reported percentage
    #[must_use]
    pub const fn last(&self) -> u8 {
        self.last
    }

    pub async fn start(&mut self) -> Result<SendOutcome, ProgressError> {
        if self.state != TrackerState::Idle {
            return Err(ProgressError::AlreadyStarted);
        }
        self.state = TrackerState::Started;
        Ok(self.emit(ProgressEvent::Started).await)
    }

    /// Report `percent`; it may repeat the last value but never go below it
    pub async fn tick(&mut self, percent: u8) -> Result<SendOutcome, ProgressError> {
        if self.state == TrackerState::Idle {
            return Err(ProgressError::NotStarted);
        }
        if percent > 100 {
            return Err(ProgressError::OutOfRange(percent));
        }
        if percent < self.last {
            return Err(ProgressError::Regressed {
                from: self.last,
                to: percent,
            });
        }
        self.state = TrackerState::InProgress;
        self.last = percent;
        Ok(self.emit(ProgressEvent::Progress { percent }).await)
    }

    pub async fn finish(self, summary: RetrievalSummary) -> Result<SendOutcome, ProgressError> {
        if self.state == TrackerState::Idle {
            return Err(ProgressError::NotStarted);
        }
        Ok(self.emit(ProgressEvent::Completed { summary }).await)
    }

    pub async fn fail(self, reason: impl Into<String>) -> Result<SendOutcome, ProgressError> {
        if self.state == TrackerState::Idle {
            return Err(ProgressError::NotStarted);
        }
        let reason = reason.into();
        Ok(self.emit(ProgressEvent::Failed { reason }).await)
    }

    async fn emit(&self, event: ProgressEvent) -> SendOutcome {
        debug!(
            channel_id = %self.channel.id,
            session = self.channel.session,
            event_type = event.event_type(),
            "Progress event"
        );
        self.registry
            .send_to_session(&self.channel.id, self.channel.session, event)
            .await
    }
}

/// Where a tracked retrieval gets its percentages from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    /// `steps` evenly spaced ticks, `interval` apart
    Synthetic { steps: u8, interval: Duration },
    /// No intermediate ticks
    Indeterminate,
}

impl ProgressSource {
    #[must_use]
    pub fn from_config(config: &ProgressConfig) -> Self {
        if config.steps == 0 {
            return Self::Indeterminate;
        }
        Self::Synthetic {
            steps: config.steps.min(100),
            interval: config.tick_interval(),
        }
    }

    /// Percentages to report, in order
    #[must_use]
    pub fn percents(&self) -> Vec<u8> {
        match *self {
            Self::Synthetic { steps, .. } => {
                let steps = u16::from(steps.clamp(1, 100));
                (1..=steps)
                    .map(|i| u8::try_from(i * 100 / steps).unwrap_or(100))
                    .collect()
            }
            Self::Indeterminate => Vec::new(),
        }
    }

    /// Pause before each tick
    #[must_use]
    pub const fn interval(&self) -> Duration {
        match *self {
            Self::Synthetic { interval, .. } => interval,
            Self::Indeterminate => Duration::ZERO,
        }
    }
}

/// Transfer milestones handed to the forwarder
#[derive(Debug)]
enum Step {
    Opened(RetrievalSummary),
    Percent(u8),
    Finished,
    Failed(String),
}

/// Byte-level progress of an HTTP download, reported to a channel
///
/// Percentages come from bytes sent over the variant's known size and are
/// only emitted when the integer value grows. Without a known size the
/// channel sees `Started` and the terminal event only.
///
/// The observer never waits on the channel: milestones go to a forwarder
/// task that owns the tracker, so a slow channel reader cannot hold up the
/// download. Percentages only grow, so at most a hundred ticks are ever
/// queued per transfer.
pub struct TransferProgress {
    steps: mpsc::UnboundedSender<Step>,
    cancel: CancellationToken,
    total: Option<u64>,
    last: u8,
}

impl TransferProgress {
    /// Observer for the registration currently holding `channel`, or `None`
    /// when it is not connected
    #[must_use]
    pub fn attach(registry: &ChannelRegistry, channel: ChannelId) -> Option<Self> {
        let handle = registry.handle(&channel)?;
        let cancel = handle.cancel.clone();
        let (steps, pending) = mpsc::unbounded_channel();
        tokio::spawn(forward(ProgressTracker::new(registry.clone(), handle), pending));

        Some(Self {
            steps,
            cancel,
            total: None,
            last: 0,
        })
    }

    fn push(&self, step: Step) {
        // The forwarder only stops once the channel is gone
        let _ = self.steps.send(step);
    }
}

#[async_trait]
impl TransferObserver for TransferProgress {
    async fn opened(&mut self, metadata: &MediaMetadata, total: Option<u64>) {
        self.total = total.filter(|t| *t > 0);
        self.push(Step::Opened(RetrievalSummary::from(metadata)));
    }

    async fn advanced(&mut self, sent: u64) {
        let Some(total) = self.total else {
            return;
        };
        let percent = u8::try_from((u128::from(sent) * 100 / u128::from(total)).min(100))
            .unwrap_or(100);

        if percent > self.last {
            self.last = percent;
            self.push(Step::Percent(percent));
        }
    }

    async fn finished(&mut self) {
        self.push(Step::Finished);
    }

    async fn failed(&mut self, reason: &str) {
        self.push(Step::Failed(reason.to_string()));
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Drive `tracker` from transfer milestones until a terminal event is sent
/// or the channel goes away
async fn forward(mut tracker: ProgressTracker, mut steps: mpsc::UnboundedReceiver<Step>) {
    let mut summary = None;

    while let Some(step) = steps.recv().await {
        if tracker.state() == TrackerState::Idle
            && !matches!(tracker.start().await, Ok(SendOutcome::Delivered))
        {
            return;
        }

        let outcome = match step {
            Step::Opened(opened) => {
                summary = Some(opened);
                continue;
            }
            Step::Percent(percent) => tracker.tick(percent).await,
            Step::Finished => {
                let Some(summary) = summary.take() else {
                    warn!(channel_id = %tracker.channel(), "Transfer finished before it was opened");
                    return;
                };
                report(tracker.finish(summary).await);
                return;
            }
            Step::Failed(reason) => {
                report(tracker.fail(reason).await);
                return;
            }
        };

        match outcome {
            Ok(SendOutcome::Delivered) => {}
            Ok(SendOutcome::NotConnected) => return,
            Err(e) => warn!(channel_id = %tracker.channel(), error = %e, "Progress tick rejected"),
        }
    }
}

fn report(outcome: Result<SendOutcome, ProgressError>) {
    if let Err(e) = outcome {
        warn!(error = %e, "Progress transition rejected");
    }
}
