//! WebSocket endpoint: acknowledges client messages and relays broadcast events

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::AppState;
use crate::events::{ChannelObserver, EventBroadcaster};

/// Pending outbound messages per connection before the observer counts as failing
const OBSERVER_QUEUE_CAPACITY: usize = 64;

const ACK_MESSAGE: &str = r#"{"type":"ack","message":"Received"}"#;

pub async fn websocket_handler(
    State(service): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let broadcaster = service.broadcaster();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<EventBroadcaster>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(OBSERVER_QUEUE_CAPACITY);

    let observer_id = broadcaster
        .subscribe(Arc::new(ChannelObserver::new(tx.clone())))
        .await;
    info!("New WebSocket client connected ({})", observer_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text.as_ref().into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        let ack: Arc<str> = Arc::from(ACK_MESSAGE);
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<serde_json::Value>(text.as_str()) {
                        Ok(value) => info!("Received WebSocket message: {}", value),
                        Err(_) => info!("Received WebSocket text: {}", text.as_str()),
                    }
                    if tx.send(ack.clone()).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => debug!("Ignoring non-text WebSocket frame"),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.unsubscribe(observer_id).await;
    info!("WebSocket client disconnected ({})", observer_id);
}
