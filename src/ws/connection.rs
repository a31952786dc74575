//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered registry events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::api::dto::StatsResponse;
use crate::domain::{RegistryError, RegistryEvent, ResultRegistry};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<RegistryEvent>,
    registry: Arc<ResultRegistry<Value>>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &mut subs, &registry);
                        if ws_tx.send(Message::text(reply.to_json())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(registry_event) => {
                        if subs.matches(&registry_event) {
                            let mut msg = WsMessage::new(
                                uuid::Uuid::new_v4().to_string(),
                                WsMessageType::Event,
                                serde_json::to_value(&registry_event).unwrap_or_default(),
                            );
                            msg.timestamp = registry_event.timestamp();
                            if ws_tx.send(Message::text(msg.to_json())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client and builds the reply.
fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    registry: &ResultRegistry<Value>,
) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON");
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "expected a command message");
    }
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command");
    };

    let payload = match command {
        WsCommand::Subscribe { keys } => {
            subs.subscribe(&keys);
            serde_json::json!({
                "subscribed": keys,
                "count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::Unsubscribe { keys } => {
            subs.unsubscribe(&keys);
            serde_json::json!({
                "unsubscribed": keys,
                "remaining_count": subs.count(),
            })
        }
        WsCommand::Stats => {
            serde_json::to_value(StatsResponse::from(registry.stats())).unwrap_or_default()
        }
        WsCommand::Status { key } => {
            let error = registry.error(&key);
            serde_json::json!({
                "status": registry.status(&key),
                "timed_out": error.as_ref().is_some_and(RegistryError::is_timeout),
                "error": error.map(|e| e.to_string()),
                "key": key,
            })
        }
    };
    WsMessage::new(msg.id, WsMessageType::Response, payload)
}
