use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mediagate_core::config::ChannelConfig;
use mediagate_core::models::ChannelId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::events::ChannelMessage;

/// Result of `ChannelRegistry::send_to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    NotConnected,
}

impl SendOutcome {
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// One registration of a channel id
///
/// Sends through a handle only reach the registration it was taken from;
/// once that connection ends, a reconnect under the same id is a different
/// channel and the handle goes quiet.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub id: ChannelId,
    pub session: u64,
    /// Cancelled when this registration disconnects
    pub cancel: CancellationToken,
}

/// Receiving side of a connected channel
///
/// Held by the channel's single writer. Dropping it closes the queue, and
/// the next `send_to` prunes the registration.
#[derive(Debug)]
pub struct Subscription {
    pub id: ChannelId,
    /// Distinguishes this registration from later reconnects under the same id
    pub session: u64,
    pub receiver: mpsc::Receiver<ChannelMessage>,
    /// Cancelled when the channel disconnects
    pub cancel: CancellationToken,
}

impl Subscription {
    #[must_use]
    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            id: self.id.clone(),
            session: self.session,
            cancel: self.cancel.clone(),
        }
    }
}

#[derive(Debug)]
struct Channel {
    session: u64,
    sender: mpsc::Sender<ChannelMessage>,
    cancel: CancellationToken,
    connected_at: Instant,
    message_count: Arc<AtomicU64>,
}

/// Snapshot of registry counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryMetrics {
    pub connected: usize,
    /// Channels ever connected
    pub total_connections: u64,
    /// Messages ever queued
    pub total_messages: u64,
}

/// Owner of every live progress channel
///
/// Callers only ever hold a `ChannelId` or a `ChannelHandle`; the queue
/// sender never leaves the registry.
#[derive(Clone)]
pub struct ChannelRegistry {
    channels: Arc<DashMap<ChannelId, Channel>>,
    queue_capacity: usize,
    max_channels: usize,
    /// Slots taken, reserved before the map entry is claimed
    live: Arc<AtomicUsize>,
    next_session: Arc<AtomicU64>,
    total_connections: Arc<AtomicU64>,
    total_messages: Arc<AtomicU64>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            queue_capacity: config.queue_capacity.max(1),
            max_channels: config.max_channels,
            live: Arc::new(AtomicUsize::new(0)),
            next_session: Arc::new(AtomicU64::new(1)),
            total_connections: Arc::new(AtomicU64::new(0)),
            total_messages: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register `id` and hand back the receiving half of its queue
    ///
    /// An id that is already connected is rejected and the live channel is
    /// left as it was.
    pub fn connect(&self, id: ChannelId) -> Result<Subscription, SessionError> {
        let reserved = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_channels).then_some(n + 1)
            });
        if reserved.is_err() {
            warn!(channel_id = %id, max_channels = self.max_channels, "Channel rejected, registry full");
            return Err(SessionError::AtCapacity(self.max_channels));
        }

        let entry = match self.channels.entry(id.clone()) {
            Entry::Occupied(_) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                warn!(channel_id = %id, "Channel rejected, id already connected");
                return Err(SessionError::AlreadyConnected(id));
            }
            Entry::Vacant(entry) => entry,
        };

        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        entry.insert(Channel {
            session,
            sender,
            cancel: cancel.clone(),
            connected_at: Instant::now(),
            message_count: Arc::new(AtomicU64::new(0)),
        });

        self.total_connections.fetch_add(1, Ordering::Relaxed);
        info!(
            channel_id = %id,
            session = session,
            connected = self.live.load(Ordering::Acquire),
            "Channel connected"
        );

        Ok(Subscription {
            id,
            session,
            receiver,
            cancel,
        })
    }

    /// Remove `id`; a no-op when it is not connected
    pub fn disconnect(&self, id: &ChannelId) {
        if let Some((_, channel)) = self.channels.remove(id) {
            self.closed(id, &channel);
        }
    }

    /// Remove `id` only while it is still held by `session`
    ///
    /// A connection that ends after its id was reclaimed must not tear down
    /// the newer registration.
    pub fn disconnect_session(&self, id: &ChannelId, session: u64) {
        if let Some((_, channel)) = self.channels.remove_if(id, |_, c| c.session == session) {
            self.closed(id, &channel);
        }
    }

    /// Disconnect every channel, cancelling their tokens
    pub fn close_all(&self) {
        let ids: Vec<ChannelId> = self.channels.iter().map(|c| c.key().clone()).collect();
        for id in &ids {
            self.disconnect(id);
        }
        if !ids.is_empty() {
            info!(closed = ids.len(), "All channels closed");
        }
    }

    fn closed(&self, id: &ChannelId, channel: &Channel) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        channel.cancel.cancel();
        info!(
            channel_id = %id,
            session = channel.session,
            duration = ?channel.connected_at.elapsed(),
            message_count = channel.message_count.load(Ordering::Relaxed),
            "Channel disconnected"
        );
    }

    /// Queue `message` for whoever holds `id` now, waiting while the queue
    /// is full
    ///
    /// Never fails: a missing or closed channel yields `NotConnected`.
    pub async fn send_to(&self, id: &ChannelId, message: impl Into<ChannelMessage>) -> SendOutcome {
        self.send_matching(id, None, message.into()).await
    }

    /// Like `send_to`, but only to the registration identified by `session`
    pub async fn send_to_session(
        &self,
        id: &ChannelId,
        session: u64,
        message: impl Into<ChannelMessage>,
    ) -> SendOutcome {
        self.send_matching(id, Some(session), message.into()).await
    }

    async fn send_matching(
        &self,
        id: &ChannelId,
        session: Option<u64>,
        message: ChannelMessage,
    ) -> SendOutcome {
        // Clone out of the map so no shard lock is held while waiting
        let Some((sender, current, cancel, counter)) = self
            .channels
            .get(id)
            .filter(|c| session.map_or(true, |s| s == c.session))
            .map(|c| {
                (
                    c.sender.clone(),
                    c.session,
                    c.cancel.clone(),
                    Arc::clone(&c.message_count),
                )
            })
        else {
            debug!(channel_id = %id, "Dropping message for unconnected channel");
            return SendOutcome::NotConnected;
        };

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return SendOutcome::NotConnected,
            sent = sender.send(message) => sent,
        };
        if sent.is_err() {
            debug!(channel_id = %id, session = current, "Channel queue closed, pruning");
            self.disconnect_session(id, current);
            return SendOutcome::NotConnected;
        }

        counter.fetch_add(1, Ordering::Relaxed);
        self.total_messages.fetch_add(1, Ordering::Relaxed);
        SendOutcome::Delivered
    }

    /// Handle on the registration currently holding `id`
    #[must_use]
    pub fn handle(&self, id: &ChannelId) -> Option<ChannelHandle> {
        self.channels.get(id).map(|c| ChannelHandle {
            id: id.clone(),
            session: c.session,
            cancel: c.cancel.clone(),
        })
    }

    #[must_use]
    pub fn is_connected(&self, id: &ChannelId) -> bool {
        self.channels.contains_key(id)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    /// How long `id` has been connected
    #[must_use]
    pub fn connected_for(&self, id: &ChannelId) -> Option<Duration> {
        self.channels.get(id).map(|c| c.connected_at.elapsed())
    }

    #[must_use]
    pub fn metrics(&self) -> RegistryMetrics {
        RegistryMetrics {
            connected: self.channels.len(),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            total_messages: self.total_messages.load(Ordering::Relaxed),
        }
    }
}
