//! Integration tests for progress channels
//!
//! Drives the registry, the Progress Protocol and the delivery pipeline
//! together against the in-memory extractor.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use mediagate_core::config::ChannelConfig;
use mediagate_core::models::{ChannelId, DownloadRequest, Locator};
use mediagate_core::provider::{StaticExtractor, StaticMedia};
use mediagate_core::service::{DeliveryService, MetadataService};
use mediagate_session::{
    ChannelMessage, ChannelRegistry, ProgressSource, RetrievalOutcome, RetrievalRunner,
    SendOutcome, Subscription, TransferProgress,
};

fn extractor() -> StaticExtractor {
    StaticExtractor::new()
        .with_media(
            "good-locator",
            StaticMedia::sample("Clip", Some(400)).with_chunks(vec![vec![0u8; 100]; 4]),
        )
        .with_failure("bad-locator", "Video unavailable")
}

fn drain(sub: &mut Subscription) -> Vec<ChannelMessage> {
    let mut seen = Vec::new();
    while let Ok(message) = sub.receiver.try_recv() {
        seen.push(message);
    }
    seen
}

/// Receive until a terminal frame arrives; transfer progress is forwarded
/// from its own task
async fn until_terminal(sub: &mut Subscription) -> Vec<ChannelMessage> {
    let mut seen = Vec::new();
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), sub.receiver.recv())
            .await
            .expect("timed out waiting for a terminal event")
            .expect("channel closed");
        let terminal = !matches!(message, ChannelMessage::Progress { .. });
        seen.push(message);
        if terminal {
            return seen;
        }
    }
}

/// Checks `Started, Progress*, terminal` with non-decreasing percentages
fn assert_grammar(messages: &[ChannelMessage]) {
    let (first, rest) = messages.split_first().expect("no events");
    assert_eq!(
        first,
        &ChannelMessage::Progress {
            message: "Starting download...".to_string(),
            progress: 0,
        }
    );
    let (last, ticks) = rest.split_last().expect("no terminal event");
    assert!(matches!(
        last,
        ChannelMessage::Complete { .. } | ChannelMessage::Error { .. }
    ));

    let mut previous = 0;
    for tick in ticks {
        match tick {
            ChannelMessage::Progress { progress, .. } => {
                assert!(*progress >= previous && *progress <= 100);
                previous = *progress;
            }
            other => panic!("terminal event before the end: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_tracked_retrieval_over_channel() {
    let registry = ChannelRegistry::new(&ChannelConfig::default());
    let metadata = MetadataService::new(Arc::new(extractor()));
    let runner = RetrievalRunner::new(
        registry.clone(),
        metadata,
        ProgressSource::Synthetic {
            steps: 10,
            interval: Duration::from_millis(1),
        },
    );
    let mut sub = registry.connect(ChannelId::from("client-1")).unwrap();

    let request = DownloadRequest::new(Locator::parse("good-locator").unwrap(), None);
    assert_eq!(
        runner.run(&sub.handle(), &request).await,
        RetrievalOutcome::Completed
    );

    let messages = drain(&mut sub);
    assert_grammar(&messages);
    assert_eq!(messages.len(), 12);
}

#[tokio::test]
async fn test_download_reports_byte_progress() {
    let registry = ChannelRegistry::new(&ChannelConfig::default());
    let delivery = DeliveryService::new(Arc::new(extractor()));
    let id = ChannelId::from("client-1");
    let mut sub = registry.connect(id.clone()).unwrap();

    let observer = TransferProgress::attach(&registry, id).unwrap();
    let request = DownloadRequest::new(Locator::parse("good-locator").unwrap(), Some("18".into()));
    let download = delivery.deliver(request, Some(Box::new(observer))).await.unwrap();

    let body: Vec<_> = download.body.collect().await;
    assert_eq!(body.len(), 4);

    let messages = until_terminal(&mut sub).await;
    assert_grammar(&messages);
    let percents: Vec<u8> = messages
        .iter()
        .filter_map(|m| match m {
            ChannelMessage::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![0, 25, 50, 75, 100]);
}

#[tokio::test]
async fn test_failed_download_reports_error_to_channel() {
    let registry = ChannelRegistry::new(&ChannelConfig::default());
    let delivery = DeliveryService::new(Arc::new(extractor()));
    let id = ChannelId::from("client-1");
    let mut sub = registry.connect(id.clone()).unwrap();

    let observer = TransferProgress::attach(&registry, id).unwrap();
    let request = DownloadRequest::new(Locator::parse("bad-locator").unwrap(), None);
    let err = delivery
        .deliver(request, Some(Box::new(observer)))
        .await
        .unwrap_err();

    let messages = until_terminal(&mut sub).await;
    assert_grammar(&messages);
    assert_eq!(
        messages.last().unwrap(),
        &ChannelMessage::error(err.to_string())
    );
}

#[tokio::test]
async fn test_channel_disconnect_aborts_download() {
    let extractor = StaticExtractor::new().with_media(
        "slow-locator",
        StaticMedia::sample("Clip", Some(400))
            .with_chunks(vec![vec![0u8; 100]; 2])
            .stalling(),
    );
    let registry = ChannelRegistry::new(&ChannelConfig::default());
    let delivery = DeliveryService::new(Arc::new(extractor));
    let id = ChannelId::from("client-1");
    let _sub = registry.connect(id.clone()).unwrap();

    let observer = TransferProgress::attach(&registry, id.clone()).unwrap();
    let request = DownloadRequest::new(Locator::parse("slow-locator").unwrap(), None);
    let mut body = delivery
        .deliver(request, Some(Box::new(observer)))
        .await
        .unwrap()
        .body;

    body.next().await.unwrap().unwrap();
    body.next().await.unwrap().unwrap();
    registry.disconnect(&id);

    let aborted = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .unwrap()
        .unwrap();
    assert!(aborted.is_err());
}

#[tokio::test]
async fn test_concurrent_senders_never_interleave() {
    let registry = ChannelRegistry::new(&ChannelConfig {
        queue_capacity: 4,
        ..ChannelConfig::default()
    });
    let id = ChannelId::from("client-1");
    let mut sub = registry.connect(id.clone()).unwrap();

    let mut senders = Vec::new();
    for sender in 0..4 {
        let registry = registry.clone();
        let id = id.clone();
        senders.push(tokio::spawn(async move {
            for n in 0..25 {
                let outcome = registry
                    .send_to(&id, ChannelMessage::error(format!("{sender}:{n}")))
                    .await;
                assert_eq!(outcome, SendOutcome::Delivered);
            }
        }));
    }

    let mut last_seen = [None::<u32>; 4];
    for _ in 0..100 {
        let Some(ChannelMessage::Error { message }) = sub.receiver.recv().await else {
            panic!("unexpected message");
        };
        let (sender, n) = message.split_once(':').unwrap();
        let sender: usize = sender.parse().unwrap();
        let n: u32 = n.parse().unwrap();
        // Each sender's messages arrive whole and in order
        assert!(last_seen[sender].map_or(n == 0, |prev| n == prev + 1));
        last_seen[sender] = Some(n);
    }

    for sender in senders {
        sender.await.unwrap();
    }
}

#[tokio::test]
async fn test_sends_after_disconnect_are_no_ops() {
    let registry = ChannelRegistry::new(&ChannelConfig::default());
    let id = ChannelId::from("client-1");
    let sub = registry.connect(id.clone()).unwrap();
    registry.disconnect_session(&id, sub.session);

    for _ in 0..3 {
        assert_eq!(
            registry.send_to(&id, ChannelMessage::error("late")).await,
            SendOutcome::NotConnected
        );
    }
}

#[tokio::test]
async fn test_stalled_channel_reader_does_not_stall_download() {
    let extractor = StaticExtractor::new().with_media(
        "good-locator",
        StaticMedia::sample("Clip", Some(10)).with_chunks(vec![vec![0u8; 1]; 10]),
    );
    let registry = ChannelRegistry::new(&ChannelConfig {
        queue_capacity: 2,
        ..ChannelConfig::default()
    });
    let delivery = DeliveryService::new(Arc::new(extractor));
    let id = ChannelId::from("client-1");
    let mut sub = registry.connect(id.clone()).unwrap();

    let observer = TransferProgress::attach(&registry, id).unwrap();
    let request = DownloadRequest::new(Locator::parse("good-locator").unwrap(), Some("18".into()));
    let download = delivery.deliver(request, Some(Box::new(observer))).await.unwrap();

    // The channel queue is never drained while the body streams
    let body: Vec<_> = tokio::time::timeout(Duration::from_secs(2), download.body.collect())
        .await
        .expect("download stalled behind the progress channel");
    assert_eq!(body.len(), 10);

    let messages = until_terminal(&mut sub).await;
    assert_grammar(&messages);
    assert!(matches!(messages.last(), Some(ChannelMessage::Complete { .. })));
}

#[tokio::test]
async fn test_reconnect_during_download_gets_no_stale_progress() {
    let extractor = StaticExtractor::new().with_media(
        "good-locator",
        StaticMedia::sample("Clip", Some(400))
            .with_chunks(vec![vec![0u8; 100]; 4])
            .with_chunk_delay(Duration::from_millis(20)),
    );
    let registry = ChannelRegistry::new(&ChannelConfig::default());
    let delivery = DeliveryService::new(Arc::new(extractor));
    let id = ChannelId::from("client-1");
    let _old = registry.connect(id.clone()).unwrap();

    let observer = TransferProgress::attach(&registry, id.clone()).unwrap();
    let request = DownloadRequest::new(Locator::parse("good-locator").unwrap(), Some("18".into()));
    let mut body = delivery
        .deliver(request, Some(Box::new(observer)))
        .await
        .unwrap()
        .body;
    body.next().await.unwrap().unwrap();

    registry.disconnect(&id);
    let mut new = registry.connect(id.clone()).unwrap();

    // The download was tied to the old registration and is aborted with it
    let rest: Vec<_> = body.collect().await;
    assert!(rest.last().is_some_and(Result::is_err));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(drain(&mut new).is_empty());
}
