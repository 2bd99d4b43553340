//! WebSocket transport — upgrades `/ws/client` and `/ws/controller`,
//! then splits each socket into a reader loop and a writer task connected
//! by an internal `ChannelHandle` (spec §4.1, §9).
//!
//! The split-sender/writer-task shape is the same one used for streaming
//! command connections elsewhere in the ecosystem: one task owns the
//! socket's write half and drains an mpsc queue, so any number of other
//! tasks can enqueue frames without fighting over the socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use garden_core::channel::{ChannelHandle, ChannelId, OutgoingMessage};

use crate::broker::Broker;
use crate::{client_handler, controller_handler};

pub async fn client_ws_handler(
    ws: WebSocketUpgrade,
    State(broker): State<Arc<Broker>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_socket(socket, broker))
}

pub async fn controller_ws_handler(
    ws: WebSocketUpgrade,
    State(broker): State<Arc<Broker>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_controller_socket(socket, broker))
}

async fn handle_client_socket(socket: WebSocket, broker: Arc<Broker>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let channel_id = ChannelId::next();
    let handle = ChannelHandle::new(channel_id, tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                OutgoingMessage::Frame(frame) => {
                    if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                OutgoingMessage::Close(reason) => {
                    let _ = sink
                        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                            code: 4000,
                            reason: reason.code().into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        if let Err(err) = client_handler::handle_text(&broker, &handle, &text).await {
            handle.send(garden_core::protocol::error_envelope(None, &err));
        }
    }

    info!(channel_id = channel_id.0, "client connection closed");
    broker.registry.detach_client(channel_id).await;
    writer.abort();
}

async fn handle_controller_socket(socket: WebSocket, broker: Arc<Broker>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let channel_id = ChannelId::next();
    let handle = ChannelHandle::new(channel_id, tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                OutgoingMessage::Frame(frame) => {
                    if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                OutgoingMessage::Close(reason) => {
                    let _ = sink
                        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                            code: 4000,
                            reason: reason.code().into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        if let Err(err) = controller_handler::handle_text(&broker, &handle, &text).await {
            warn!(error = %err, "controller frame rejected");
            handle.send(garden_core::protocol::error_envelope(None, &err));
        } else {
            debug!("controller frame handled");
        }
    }

    info!(channel_id = channel_id.0, "controller connection closed");
    broker.registry.unbind_controller(channel_id).await;
    writer.abort();
}
