//! WebSocket progress channel
//!
//! Each connection registers its client id with the `ChannelRegistry` before
//! the upgrade, so a duplicate id is refused with 409 and the live channel is
//! left alone. After the upgrade the connection runs three pieces:
//! a writer draining the channel queue into the socket, a reader turning
//! inbound frames into requests, and the handler running requested
//! retrievals one at a time. All three stop once the channel is cancelled,
//! by the client leaving or by shutdown.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use mediagate_core::models::{ChannelId, DownloadRequest, Locator};
use mediagate_session::{
    ChannelHandle, ChannelMessage, ChannelRegistry, ClientRequest, Subscription,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::http::{AppResult, AppState};

/// Pending retrieval requests buffered per connection
const REQUEST_QUEUE: usize = 16;

/// WebSocket handler for progress channels
///
/// GET /ws/{client_id}
pub async fn websocket_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let id = ChannelId::parse(&client_id)?;
    let subscription = state.registry.connect(id.clone())?;
    let session = subscription.session;

    let registry = state.registry.clone();
    Ok(ws
        .max_message_size(state.max_message_size)
        .on_failed_upgrade(move |e| {
            warn!(channel_id = %id, error = %e, "WebSocket upgrade failed");
            registry.disconnect_session(&id, session);
        })
        .on_upgrade(move |socket| handle_socket(socket, state, subscription)))
}

async fn handle_socket(socket: WebSocket, state: AppState, subscription: Subscription) {
    let handle = subscription.handle();
    let Subscription {
        id,
        session,
        receiver,
        cancel,
    } = subscription;
    info!(channel_id = %id, session = session, "WebSocket connection established");

    let (sink, stream) = socket.split();
    let (request_tx, mut request_rx) = mpsc::channel(REQUEST_QUEUE);

    // Channel queue -> socket
    let writer = tokio::spawn(write_loop(
        sink,
        receiver,
        state.registry.clone(),
        handle.clone(),
    ));

    // Socket -> retrieval requests
    let reader = tokio::spawn(read_loop(stream, request_tx, state.registry.clone(), handle.clone()));

    loop {
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            request = request_rx.recv() => request,
        };
        let Some(request) = request else { break };
        state.runner.run(&handle, &request).await;
    }

    state.registry.disconnect_session(&id, session);
    let _ = reader.await;
    let _ = writer.await;

    info!(channel_id = %id, session = session, "WebSocket connection closed");
}

async fn write_loop(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut receiver: mpsc::Receiver<ChannelMessage>,
    registry: ChannelRegistry,
    channel: ChannelHandle,
) {
    loop {
        let message = tokio::select! {
            () = channel.cancel.cancelled() => break,
            message = receiver.recv() => message,
        };
        let Some(message) = message else { break };

        if let Err(e) = sink.send(Message::Text(message.to_json().into())).await {
            debug!(channel_id = %channel.id, error = %e, "Failed to send WebSocket message");
            registry.disconnect_session(&channel.id, channel.session);
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: futures::stream::SplitStream<WebSocket>,
    requests: mpsc::Sender<DownloadRequest>,
    registry: ChannelRegistry,
    channel: ChannelHandle,
) {
    let ChannelHandle { id, session, cancel } = &channel;

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(channel_id = %id, error = %e, "WebSocket receive failed");
                break;
            }
        };

        match ClientRequest::parse(text.as_str()) {
            Ok(ClientRequest::Download { url, format }) => match Locator::parse(&url) {
                Ok(locator) => {
                    if requests.send(DownloadRequest::new(locator, format)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    registry
                        .send_to_session(id, *session, ChannelMessage::error(e.detail()))
                        .await;
                }
            },
            Ok(ClientRequest::Other(kind)) => {
                debug!(channel_id = %id, message_type = %kind, "Ignoring message");
            }
            Err(e) => {
                debug!(channel_id = %id, error = %e, "Malformed WebSocket message");
                registry
                    .send_to_session(
                        id,
                        *session,
                        ChannelMessage::error("Invalid message: expected a JSON object"),
                    )
                    .await;
            }
        }
    }

    // Closing the channel also cancels any retrieval still running for it
    registry.disconnect_session(id, *session);
}
